//! Release ref validation and normalization.
use color_eyre::eyre::eyre;

use crate::result::Result;

/// Normalize a user-supplied ref into a canonical release tag
/// (`M.m.p[-rc.N]`) or release branch (`M.m.x`) form.
///
/// Values listed in `ignore` are returned unchanged; this is how the default
/// target ref (`origin/master`) passes through. A two-component shorthand
/// such as `7.16` is always rejected because it could mean either the latest
/// patch release or the release branch.
pub fn normalize_ref(value: &str, ignore: &[&str]) -> Result<String> {
    if ignore.contains(&value) {
        return Ok(value.to_string());
    }

    let parts: Vec<&str> = value.split('.').collect();

    if parts.len() == 2 {
        return Err(eyre!(
            "using a minor version ({value}) is ambiguous, use a release tag \
             (e.g. {value}.1) or a release branch (e.g. {value}.x) instead"
        ));
    }

    if parts.len() == 3 && parts[2] == "x" {
        // Release branch, e.g. '7.17.x'. Validate it as 'M.m.0' and re-emit
        // the branch form.
        let version = parse(&format!("{}.{}.0", parts[0], parts[1]))?;
        return Ok(format!("{}.{}.x", version.major, version.minor));
    }

    // Fully-resolved version string, e.g. '7.17.0' or '7.17.0-rc.2'.
    Ok(parse(value)?.to_string())
}

fn parse(value: &str) -> Result<semver::Version> {
    semver::Version::parse(value)
        .map_err(|_| eyre!("ref needs to be in semver format M.m.p[-r], got {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_minor_version_shorthand() {
        let err = normalize_ref("7.16", &[]).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn normalizes_release_branches() {
        assert_eq!(normalize_ref("7.17.x", &[]).unwrap(), "7.17.x");
        assert_eq!(normalize_ref("6.16.x", &[]).unwrap(), "6.16.x");
    }

    #[test]
    fn full_versions_round_trip() {
        assert_eq!(normalize_ref("7.17.0", &[]).unwrap(), "7.17.0");
        assert_eq!(normalize_ref("7.17.0-rc.2", &[]).unwrap(), "7.17.0-rc.2");
    }

    #[test]
    fn ignored_values_pass_through() {
        let normalized = normalize_ref("origin/master", &["origin/master"]);
        assert_eq!(normalized.unwrap(), "origin/master");
    }

    #[test]
    fn rejects_invalid_versions() {
        assert!(normalize_ref("not-a-version", &[]).is_err());
        assert!(normalize_ref("7.x.0", &[]).is_err());
    }
}
