//! Trello card creation and label-based team routing.
use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::result::Result;

const CARDS_ENDPOINT: &str = "https://api.trello.com/1/cards";

/// Board lists cards land on, one per team.
const TEAM_LISTS: &[(&str, &str)] = &[
    ("Containers", "5ae1cab495edd80852396c71"),
    ("Core", "5ae1e3d62a5167779e65e87d"),
    ("Integrations", "5ae1e3e2c81fff836d00497e"),
    ("Logs", "5aeca4c19707c4222bf6d883"),
    ("Platform", "5d9b687492952e6578ecf04d"),
    ("Process", "5aeca4c8621e4359b9cb9c27"),
    ("Trace", "5bcf3ffbe0651642ae029038"),
];

/// Outcome of one card-creation attempt. Rate limiting and generic errors
/// are retried by the dispatcher; they are data here, not `Err`s.
#[derive(Debug)]
pub enum CardOutcome {
    Created { url: String },
    RateLimited,
    Failed(String),
}

/// Seam over the Trello API so card dispatch can be tested against mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CardBoard {
    /// Create a card on the given team's list.
    async fn create_card(
        &self,
        team: &str,
        title: &str,
        body: &str,
    ) -> Result<CardOutcome>;
}

/// Maps PR labels to the team whose list should receive the card. PRs with
/// at least one mapped label are routed without prompting.
pub struct TeamRouter {
    map: BTreeMap<String, String>,
}

impl Default for TeamRouter {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        for (label, team) in [
            ("team/agent-apm", "Trace"),
            ("team/agent-core", "Core"),
            ("team/agent-platform", "Platform"),
            ("team/containers", "Containers"),
            ("team/integrations", "Integrations"),
            ("team/logs", "Logs"),
            ("team/processes", "Process"),
        ] {
            map.insert(label.to_string(), team.to_string());
        }
        Self { map }
    }
}

impl TeamRouter {
    /// All teams mapped from the given labels, in label order.
    pub fn teams_for(&self, labels: &[String]) -> Vec<&str> {
        labels
            .iter()
            .filter_map(|label| self.map.get(label))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    url: String,
}

/// Trello client authenticated with an API key/token pair.
pub struct Trello {
    client: reqwest::Client,
    key: SecretString,
    token: SecretString,
    lists: BTreeMap<&'static str, &'static str>,
}

impl Trello {
    pub fn new(key: SecretString, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            key,
            token,
            lists: TEAM_LISTS.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl CardBoard for Trello {
    async fn create_card(
        &self,
        team: &str,
        title: &str,
        body: &str,
    ) -> Result<CardOutcome> {
        let list_id = self
            .lists
            .get(team)
            .ok_or_else(|| eyre!("no Trello list configured for team {team}"))?;

        let response = self
            .client
            .post(CARDS_ENDPOINT)
            .query(&[
                ("idList", *list_id),
                ("name", title),
                ("desc", body),
                ("key", self.key.expose_secret()),
                ("token", self.token.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(CardOutcome::RateLimited);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Ok(CardOutcome::Failed(format!("{status}: {text}")));
        }

        let card: CardResponse = response.json().await?;

        Ok(CardOutcome::Created { url: card.url })
    }
}
