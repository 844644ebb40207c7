//! GitHub PR metadata resolution.
use async_trait::async_trait;
use color_eyre::eyre::eyre;
use octocrab::Octocrab;
use regex::Regex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::{repo::RepoKind, result::Result};

/// Owner of the supported repositories.
pub const REPO_OWNER: &str = "DataDog";

/// Labels encoding whether/how a PR affects the changelog.
pub const CHANGELOG_LABEL_PREFIX: &str = "changelog/";
/// Changelog type meaning "no changelog entry".
pub const CHANGELOG_TYPE_NONE: &str = "no-changelog";

/// PR metadata needed to review a change and fill in a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrData {
    /// PR number, or the commit hash for direct commits to the default
    /// branch. Deduplication across a run keys on this.
    pub id: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub body: String,
    /// Label names, sorted.
    pub labels: Vec<String>,
    pub milestone: Option<String>,
}

/// Outcome of a single PR lookup. The HTTP statuses the review loop must
/// react to are enumerated so every call site handles them exhaustively; any
/// other non-success status is a plain error.
#[derive(Debug)]
pub enum Lookup {
    Found(PrData),
    /// 404, or an empty commit search.
    NotFound,
    /// 403, warn and skip the item.
    RateLimited,
    /// 401, fatal at the call site.
    AuthDenied,
}

/// Narrow seam over the GitHub API so the review loop can be tested against
/// mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrSource {
    /// Fetch PR metadata directly by number.
    async fn pr_by_number(&self, number: u64) -> Result<Lookup>;

    /// Search for the PR associated with a commit hash.
    async fn pr_for_commit(&self, sha: &str) -> Result<Lookup>;
}

/// Extract the PR number a squash-merged commit subject refers to, e.g.
/// `fix agent config (#1234)` or `Fixes #10`. The last reference wins.
pub fn parse_pr_number(subject: &str) -> Option<u64> {
    let re = Regex::new(r"#(\d+)").ok()?;
    re.captures_iter(subject)
        .last()?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Whether a PR is a pure documentation change: it carries a documentation
/// label and no changelog label other than the "none" type. Those need no
/// testing card.
pub fn docs_only(labels: &[String]) -> bool {
    let documentation = labels.iter().any(|l| l.starts_with("documentation"));

    let has_changelog = labels.iter().any(|l| {
        l.strip_prefix(CHANGELOG_LABEL_PREFIX)
            .is_some_and(|kind| kind != CHANGELOG_TYPE_NONE)
    });

    documentation && !has_changelog
}

/// Render a PR id for messages: `#123` for PR numbers, the bare hash for
/// direct commits.
pub fn format_commit_id(id: &str) -> String {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        format!("#{id}")
    } else {
        id.to_string()
    }
}

/// GitHub client backed by Octocrab.
pub struct Github {
    instance: Octocrab,
    repo: &'static str,
}

impl Github {
    /// Build a client, authenticated if a token is available. Without a token
    /// the public API rate limits show up as 403 lookups, which the review
    /// loop skips over.
    pub fn new(kind: RepoKind, token: Option<SecretString>) -> Result<Self> {
        let mut builder = Octocrab::builder();

        if let Some(token) = token {
            builder = builder.personal_token(token.expose_secret().to_string());
        }

        Ok(Self {
            instance: builder.build()?,
            repo: kind.name(),
        })
    }

    fn from_pull(&self, pr: octocrab::models::pulls::PullRequest) -> PrData {
        let number = pr.number;

        let mut labels: Vec<String> = pr
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.name)
            .collect();
        labels.sort();

        PrData {
            id: number.to_string(),
            title: pr.title.unwrap_or_default(),
            url: pr.html_url.map(|u| u.to_string()).unwrap_or_else(|| {
                format!(
                    "https://github.com/{REPO_OWNER}/{}/pull/{number}",
                    self.repo
                )
            }),
            author: pr.user.map(|u| u.login).unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            labels,
            milestone: pr.milestone.map(|m| m.title),
        }
    }

    fn from_issue(&self, issue: octocrab::models::issues::Issue) -> PrData {
        let mut labels: Vec<String> =
            issue.labels.into_iter().map(|l| l.name).collect();
        labels.sort();

        PrData {
            id: issue.number.to_string(),
            title: issue.title,
            url: issue.html_url.to_string(),
            author: issue.user.login,
            body: issue.body.unwrap_or_default(),
            labels,
            milestone: issue.milestone.map(|m| m.title),
        }
    }
}

/// Map an API error onto the lookup outcomes the review loop understands.
/// Unexpected statuses propagate as fatal errors.
fn classify(err: octocrab::Error) -> Result<Lookup> {
    match err {
        octocrab::Error::GitHub { source, .. } => match source.status_code {
            StatusCode::UNAUTHORIZED => Ok(Lookup::AuthDenied),
            StatusCode::FORBIDDEN => Ok(Lookup::RateLimited),
            StatusCode::NOT_FOUND => Ok(Lookup::NotFound),
            status => Err(eyre!(
                "unexpected GitHub response {status}: {}",
                source.message
            )),
        },
        err => Err(err.into()),
    }
}

#[async_trait]
impl PrSource for Github {
    async fn pr_by_number(&self, number: u64) -> Result<Lookup> {
        let result = self
            .instance
            .pulls(REPO_OWNER, self.repo)
            .get(number)
            .await;

        match result {
            Ok(pr) => Ok(Lookup::Found(self.from_pull(pr))),
            Err(err) => classify(err),
        }
    }

    async fn pr_for_commit(&self, sha: &str) -> Result<Lookup> {
        let query = format!("{sha} repo:{REPO_OWNER}/{}", self.repo);

        let result = self
            .instance
            .search()
            .issues_and_pull_requests(&query)
            .send()
            .await;

        match result {
            Ok(page) => match page.items.into_iter().next() {
                Some(issue) => Ok(Lookup::Found(self.from_issue(issue))),
                None => Ok(Lookup::NotFound),
            },
            Err(err) => classify(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pr_numbers_from_subjects() {
        assert_eq!(parse_pr_number("fix agent config (#1234)"), Some(1234));
        assert_eq!(parse_pr_number("Fixes #10"), Some(10));
        assert_eq!(parse_pr_number("bump version to 7.17.0"), None);
    }

    #[test]
    fn last_pr_reference_wins() {
        let subject = "Backport #78 to 7.17.x (#92)";
        assert_eq!(parse_pr_number(subject), Some(92));
    }

    #[test]
    fn docs_only_requires_no_changelog() {
        let labels = |names: &[&str]| -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        };

        assert!(docs_only(&labels(&[
            "documentation",
            "changelog/no-changelog"
        ])));
        assert!(docs_only(&labels(&["documentation"])));
        assert!(!docs_only(&labels(&["documentation", "changelog/Fixed"])));
        assert!(!docs_only(&labels(&["changelog/no-changelog"])));
    }

    #[test]
    fn formats_commit_ids() {
        assert_eq!(format_commit_id("123"), "#123");
        assert_eq!(format_commit_id("deadbeef"), "deadbeef");
    }
}
