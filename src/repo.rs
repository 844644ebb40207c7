//! Local repository discovery and change enumeration.
//!
//! The tool must run inside a checkout of one of the two supported
//! repositories. Discovery goes through `git2`; the diff itself shells out to
//! system git because it needs `git fetch --dry` stderr (the remote-freshness
//! heuristic) and the exact `refs/tags/{base}..{target}` log fallback
//! behavior.
use color_eyre::eyre::eyre;
use log::*;
use std::{path::PathBuf, process::Command, process::Output};

use crate::result::Result;

/// A single entry of the diff between two refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Full commit hash.
    pub hash: String,
    /// Commit subject line.
    pub subject: String,
}

/// Menu entry shown while reviewing a PR interactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Create a card for this team.
    Team(&'static str),
    /// Move on to the next PR.
    Skip,
    /// End the entire run.
    Quit,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::Team(team) => team,
            MenuAction::Skip => "Skip",
            MenuAction::Quit => "Quit",
        }
    }
}

const INTEGRATIONS_CORE_MENU: &[(char, MenuAction)] = &[
    ('1', MenuAction::Team("Integrations")),
    ('2', MenuAction::Team("Containers")),
    ('3', MenuAction::Team("Core")),
    ('4', MenuAction::Team("Platform")),
    ('s', MenuAction::Skip),
    ('q', MenuAction::Quit),
];

const AGENT_MENU: &[(char, MenuAction)] = &[
    ('1', MenuAction::Team("Core")),
    ('2', MenuAction::Team("Containers")),
    ('3', MenuAction::Team("Logs")),
    ('4', MenuAction::Team("Platform")),
    ('5', MenuAction::Team("Process")),
    ('6', MenuAction::Team("Trace")),
    ('7', MenuAction::Team("Integrations")),
    ('s', MenuAction::Skip),
    ('q', MenuAction::Quit),
];

/// Supported repositories. Each kind carries its own review menu since the
/// team split differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    IntegrationsCore,
    Agent,
}

impl RepoKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "integrations-core" => Some(Self::IntegrationsCore),
            "datadog-agent" => Some(Self::Agent),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::IntegrationsCore => "integrations-core",
            Self::Agent => "datadog-agent",
        }
    }

    /// Ordered option menu for interactive review. The first entry is the
    /// default when the operator just presses Enter.
    pub fn menu(self) -> &'static [(char, MenuAction)] {
        match self {
            Self::IntegrationsCore => INTEGRATIONS_CORE_MENU,
            Self::Agent => AGENT_MENU,
        }
    }
}

/// A supported repository checkout rooted somewhere above the current
/// directory.
pub struct Repository {
    root: PathBuf,
    kind: RepoKind,
}

impl Repository {
    /// Discover the enclosing git repository and verify it is one of the
    /// supported repos. Anything else is fatal.
    pub fn discover() -> Result<Self> {
        let repo = git2::Repository::discover(".")?;
        let root = repo
            .workdir()
            .ok_or_else(|| eyre!("repository has no working directory"))?
            .to_path_buf();

        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let kind = RepoKind::from_name(&name)
            .ok_or_else(|| eyre!("repo `{name}` is unsupported"))?;

        Ok(Self { root, kind })
    }

    pub fn kind(&self) -> RepoKind {
        self.kind
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        debug!("running git {}", args.join(" "));
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()?;
        Ok(output)
    }

    /// Enumerate changes between two refs, oldest first.
    ///
    /// `base_ref` is tried as a tag (`refs/tags/{base_ref}`) first and as a
    /// release branch (`origin/{base_ref}`) second. A dry-run fetch that
    /// mentions either ref means the local clone has not seen it yet, which
    /// makes the diff unreliable.
    pub fn changes_between(
        &self,
        base_ref: &str,
        target_ref: &str,
    ) -> Result<Vec<Change>> {
        let fetch = self.git(&["fetch", "--dry"])?;
        if !fetch.status.success() {
            return Err(eyre!("unable to run git fetch --dry"));
        }

        let fetch_stderr = String::from_utf8_lossy(&fetch.stderr);
        if fetch_stderr.contains(base_ref) || fetch_stderr.contains(target_ref)
        {
            return Err(eyre!(
                "your repository is not in sync with the remote, run git \
                 fetch in {} first",
                self.root.display()
            ));
        }

        info!("getting diff between {base_ref} and {target_ref}");

        let tag_range = format!("refs/tags/{base_ref}..{target_ref}");
        let mut log =
            self.git(&["--no-pager", "log", "--pretty=format:%H %s", &tag_range])?;

        if !log.status.success() {
            warn!(
                "tag {base_ref} does not exist, retrying with release branch \
                 origin/{base_ref}"
            );
            let branch_range = format!("origin/{base_ref}..{target_ref}");
            log = self.git(&[
                "--no-pager",
                "log",
                "--pretty=format:%H %s",
                &branch_range,
            ])?;

            if !log.status.success() {
                return Err(eyre!(
                    "unable to get the diff; ensure {base_ref} and \
                     {target_ref} both refer to an existing tag or a release \
                     branch"
                ));
            }
        }

        Ok(parse_log(&String::from_utf8_lossy(&log.stdout)))
    }
}

/// Parse `git log --pretty=format:%H %s` output into changes, reversing the
/// newest-first log order into chronological order.
fn parse_log(stdout: &str) -> Vec<Change> {
    stdout
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once(' ') {
            Some((hash, subject)) => Change {
                hash: hash.to_string(),
                subject: subject.to_string(),
            },
            None => Change {
                hash: line.to_string(),
                subject: String::new(),
            },
        })
        .collect()
}
