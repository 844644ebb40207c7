//! The `testable` command: review changes between two release refs and
//! create a Trello card for everything that needs testing.
use color_eyre::eyre::eyre;
use log::*;
use secrecy::SecretString;
use std::{
    collections::HashSet,
    io::{self, Write},
    time::Duration,
};
use tokio::time::sleep;

use crate::{
    cli,
    github::{
        Github, Lookup, PrData, PrSource, REPO_OWNER, docs_only,
        format_commit_id, parse_pr_number,
    },
    repo::{Change, MenuAction, RepoKind, Repository},
    result::Result,
    trello::{CardBoard, CardOutcome, TeamRouter, Trello},
    version,
};

const CARD_CREATION_ATTEMPTS: u32 = 3;
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);
const RETRY_WAIT: Duration = Duration::from_secs(2);

/// Reads the operator's menu choice. Separated out so the review loop can be
/// driven by canned input in tests.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter {
    fn read_choice(&mut self) -> Result<String>;
}

/// Blocking stdin prompter. Terminals occasionally produce stray NUL bytes;
/// those are discarded before trimming.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_choice(&mut self) -> Result<String> {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.replace('\0', "").trim().to_string())
    }
}

/// What the review loop should do after handling one PR.
enum Flow {
    Continue,
    Quit,
}

/// Create one card per team for a PR, retrying each a bounded number of
/// times. Rate limiting waits longer than a generic error; exhausting the
/// attempts is reported but never aborts the run.
async fn create_cards(
    board: &dyn CardBoard,
    teams: &[&str],
    title: &str,
    pr_url: &str,
    pr_body: &str,
    dry_run: bool,
) -> Result<()> {
    let body = format!("Pull request: {pr_url}\n\n{pr_body}");

    for team in teams {
        if dry_run {
            info!("will create a card for team {team}: {title}");
            continue;
        }

        for attempt in 1..=CARD_CREATION_ATTEMPTS {
            match board.create_card(team, title, &body).await? {
                CardOutcome::Created { url } => {
                    info!("created card for team {team}: {url}");
                    break;
                }
                CardOutcome::RateLimited => {
                    warn!(
                        "attempt {attempt} of {CARD_CREATION_ATTEMPTS}: a \
                         rate limit is in effect, retrying in {} seconds",
                        RATE_LIMIT_WAIT.as_secs()
                    );
                    sleep(RATE_LIMIT_WAIT).await;
                }
                CardOutcome::Failed(err) => {
                    if attempt == CARD_CREATION_ATTEMPTS {
                        error!("error creating card for team {team}: {err}");
                        break;
                    }

                    warn!(
                        "attempt {attempt} of {CARD_CREATION_ATTEMPTS}: an \
                         error occurred, retrying in {} seconds",
                        RETRY_WAIT.as_secs()
                    );
                    sleep(RETRY_WAIT).await;
                }
            }
        }
    }

    Ok(())
}

/// One run of the review loop over an ordered change list.
///
/// Holds the run-scoped state: the dedup set lives in [`ReviewSession::run`]
/// and the invalid-choice message in [`ReviewSession::prompt`], both plain
/// locals.
struct ReviewSession<'a> {
    github: &'a dyn PrSource,
    board: &'a dyn CardBoard,
    router: &'a TeamRouter,
    prompter: &'a mut dyn Prompter,
    repo: RepoKind,
    milestone: Option<String>,
    dry_run: bool,
}

impl ReviewSession<'_> {
    async fn run(&mut self, changes: &[Change]) -> Result<()> {
        let total = changes.len();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for (i, change) in changes.iter().enumerate() {
            let Some(pr) = self.resolve(change).await? else {
                continue;
            };

            if !seen_ids.insert(pr.id.clone()) {
                info!("already seen PR {}, skipping it", format_commit_id(&pr.id));
                continue;
            }

            if docs_only(&pr.labels) {
                info!("skipping documentation {}", format_commit_id(&pr.id));
                continue;
            }

            if let Some(wanted) = &self.milestone
                && pr.milestone.as_deref() != Some(wanted.as_str())
            {
                info!(
                    "looking for milestone {wanted}, skipping {}",
                    format_commit_id(&pr.id)
                );
                continue;
            }

            let teams = self.router.teams_for(&pr.labels);
            if !teams.is_empty() {
                create_cards(
                    self.board, &teams, &pr.title, &pr.url, &pr.body,
                    self.dry_run,
                )
                .await?;
                continue;
            }

            match self.prompt(i + 1, total, &pr).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(()),
            }
        }

        Ok(())
    }

    /// Resolve one change to PR metadata, or `None` when the change should be
    /// skipped. A commit that never went through a PR becomes a minimal
    /// record keyed on its hash.
    async fn resolve(&self, change: &Change) -> Result<Option<PrData>> {
        if let Some(number) = parse_pr_number(&change.subject) {
            return match self.github.pr_by_number(number).await? {
                Lookup::Found(pr) => Ok(Some(pr)),
                Lookup::AuthDenied => Err(access_denied()),
                Lookup::RateLimited => {
                    error!(
                        "error getting info for #{number}, set a GitHub token \
                         to avoid rate limits"
                    );
                    Ok(None)
                }
                Lookup::NotFound => {
                    info!("skipping #{number}, not a pull request");
                    Ok(None)
                }
            };
        }

        match self.github.pr_for_commit(&change.hash).await? {
            Lookup::Found(pr) => Ok(Some(pr)),
            Lookup::AuthDenied => Err(access_denied()),
            Lookup::RateLimited => {
                error!(
                    "error getting info for {}, set a GitHub token to avoid \
                     rate limits",
                    change.hash
                );
                Ok(None)
            }
            // Commit straight to the default branch.
            Lookup::NotFound => Ok(Some(PrData {
                id: change.hash.clone(),
                title: change.subject.clone(),
                url: format!(
                    "https://github.com/{REPO_OWNER}/{}/commit/{}",
                    self.repo.name(),
                    change.hash
                ),
                author: String::new(),
                body: String::new(),
                labels: vec![],
                milestone: None,
            })),
        }
    }

    /// Show one PR and loop until the operator picks a valid option. An
    /// invalid key re-displays the same PR; Enter takes the first option.
    async fn prompt(
        &mut self,
        position: usize,
        total: usize,
        pr: &PrData,
    ) -> Result<Flow> {
        let menu = self.repo.menu();
        let (default_key, default_action) = menu[0];
        let mut choice_error = String::new();

        loop {
            println!("\n({position} of {total}) {}", pr.title);
            println!("Url: {}", pr.url);
            println!("Author: {}", pr.author);
            println!("Labels: {}", pr.labels.join(", "));
            if let Some(milestone) = &pr.milestone {
                println!("Milestone: {milestone}");
            }
            println!("{}", pr.body.replace('\r', ""));

            println!();
            for (key, action) in menu {
                println!("{key} - {}", action.label());
            }

            if !choice_error.is_empty() {
                warn!("{choice_error}");
            }

            print!("Choose an option (default {}): ", default_action.label());
            io::stdout().flush()?;

            let mut choice = self.prompter.read_choice()?;
            if choice.is_empty() {
                choice = default_key.to_string();
            }

            let Some((_, action)) =
                menu.iter().find(|(key, _)| choice == key.to_string())
            else {
                choice_error = format!("`{choice}` is not a valid option");
                continue;
            };

            match *action {
                MenuAction::Skip => {
                    info!("skipped {}", format_commit_id(&pr.id));
                    return Ok(Flow::Continue);
                }
                MenuAction::Quit => {
                    warn!("exited at {}", format_commit_id(&pr.id));
                    return Ok(Flow::Quit);
                }
                MenuAction::Team(team) => {
                    create_cards(
                        self.board,
                        &[team],
                        &pr.title,
                        &pr.url,
                        &pr.body,
                        self.dry_run,
                    )
                    .await?;
                    return Ok(Flow::Continue);
                }
            }
        }
    }
}

fn access_denied() -> color_eyre::eyre::Report {
    eyre!("access denied, ensure your GitHub token has correct permissions")
}

/// Diff the refs, resolve every change to a PR, and drive card creation.
pub async fn execute(args: &cli::Args) -> Result<()> {
    let repository = Repository::discover()?;
    let kind = repository.kind();

    let base_ref = version::normalize_ref(&args.base_ref, &[])?;
    let target_ref =
        version::normalize_ref(&args.target_ref, &[cli::DEFAULT_TARGET_REF])?;

    info!("ref {base_ref} will be compared to {target_ref}");

    let changes = repository.changes_between(&base_ref, &target_ref)?;
    info!("found {} changes", changes.len());

    let github = Github::new(kind, args.github_token())?;

    let (trello_key, trello_token) = if args.dry_run {
        // a dry run never reaches the board
        (SecretString::from(""), SecretString::from(""))
    } else {
        args.trello_credentials()?
    };
    let trello = Trello::new(trello_key, trello_token);

    let router = TeamRouter::default();
    let mut prompter = TerminalPrompter;

    let mut session = ReviewSession {
        github: &github,
        board: &trello,
        router: &router,
        prompter: &mut prompter,
        repo: kind,
        milestone: args.milestone.clone(),
        dry_run: args.dry_run,
    };

    session.run(&changes).await
}
