//! Command execution.
//!
//! Each command follows the same pattern: validate arguments, set up the
//! collaborators (local repo, GitHub, Trello), run the workflow, and surface
//! fatal errors through [`crate::result::Result`]. `--dry-run` is threaded
//! down so no remote writes happen while previewing.

/// Walk the diff between two release refs and create a testing card per PR.
pub mod testable;
