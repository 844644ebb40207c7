//! CLI argument parsing and credential resolution.
use clap::Parser;
use color_eyre::eyre::eyre;
use secrecy::SecretString;
use std::env;

use crate::result::Result;

/// Target ref used when none is given on the command line. It is passed
/// through ref normalization untouched.
pub const DEFAULT_TARGET_REF: &str = "origin/master";

/// Create a Trello card for changes since a previous release (referenced by
/// BASE_REF) that need to be tested for the next release (referenced by
/// TARGET_REF).
///
/// BASE_REF and TARGET_REF can refer to a git tag (6.17.1, 7.17.0-rc.4, ...)
/// or a release branch (6.16.x, 7.17.x, ...). A minor version shorthand such
/// as '7.16' is rejected as ambiguous.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Previous release tag or release branch to compare against.
    pub base_ref: String,

    /// Tag or branch holding the changes that need testing.
    #[arg(default_value = DEFAULT_TARGET_REF)]
    pub target_ref: String,

    /// Only create cards for PRs assigned to this milestone.
    #[arg(long)]
    pub milestone: Option<String>,

    /// Only show the changes, without creating any cards.
    #[arg(long, short = 'n', default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value = "")]
    /// GitHub personal access token. Falls back to DD_GITHUB_TOKEN env var.
    /// Optional, but unauthenticated requests hit public API rate limits.
    pub github_token: String,

    #[arg(long, default_value = "")]
    /// Trello API key. Falls back to TRELLO_KEY env var.
    pub trello_key: String,

    #[arg(long, default_value = "")]
    /// Trello API token. Falls back to TRELLO_TOKEN env var.
    pub trello_token: String,

    #[arg(long, default_value_t = false)]
    /// Enable debug logging.
    pub debug: bool,
}

impl Args {
    /// GitHub token from the flag or the environment, if any.
    pub fn github_token(&self) -> Option<SecretString> {
        resolve(&self.github_token, "DD_GITHUB_TOKEN").map(SecretString::from)
    }

    /// Trello key and token from the flags or the environment. Required for
    /// any run that writes cards.
    pub fn trello_credentials(&self) -> Result<(SecretString, SecretString)> {
        let key = resolve(&self.trello_key, "TRELLO_KEY")
            .ok_or_else(|| eyre!("must set a trello api key"))?;

        let token = resolve(&self.trello_token, "TRELLO_TOKEN")
            .ok_or_else(|| eyre!("must set a trello api token"))?;

        Ok((SecretString::from(key), SecretString::from(token)))
    }
}

fn resolve(flag: &str, env_var: &str) -> Option<String> {
    if !flag.is_empty() {
        return Some(flag.to_string());
    }

    env::var(env_var).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(trello_key: &str, trello_token: &str) -> Args {
        Args {
            base_ref: "7.16.1".into(),
            target_ref: DEFAULT_TARGET_REF.into(),
            milestone: None,
            dry_run: false,
            github_token: "".into(),
            trello_key: trello_key.into(),
            trello_token: trello_token.into(),
            debug: false,
        }
    }

    #[test]
    fn trello_credentials_require_key_and_token() {
        let result = args("some-key", "").trello_credentials();
        assert!(result.is_err());

        let result = args("some-key", "some-token").trello_credentials();
        assert!(result.is_ok());
    }

    #[test]
    fn github_token_is_optional() {
        assert!(args("k", "t").github_token().is_none());
    }
}
