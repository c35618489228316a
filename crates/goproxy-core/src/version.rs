//! Version grammar: semver, pseudo-versions, and the `latest` literal.
//!
//! A pseudo-version encodes a VCS commit as
//! `vX.Y.Z-0.yyyymmddhhmmss-abcdefabcdef` (or a handful of related
//! forms); it is recognized by shape, not by a registry lookup.

use regex::Regex;
use std::sync::LazyLock;

/// Lazily-compiled regex matching the pseudo-version suffix
/// `-yyyymmddhhmmss-<12 hex chars>`, optionally preceded by a
/// prerelease/build counter (`.0.`, `.0-`, `-0.` etc. per the real
/// encoding rules), per the Go toolchain's `module.PseudoVersion` shape.
static PSEUDO_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+\.\d+\.\d+(-[0-9A-Za-z.]+)?\.0\.\d{14}-[0-9a-f]{12}(\+incompatible)?$")
        .expect("static pseudo-version regex is valid")
});

/// Simpler pseudo-version shape used for the `vX.Y.Z-0.timestamp-hash`
/// case with no existing prerelease tag to build on top of.
static PSEUDO_VERSION_BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+\.\d+\.\d+-0\.\d{14}-[0-9a-f]{12}(\+incompatible)?$")
        .expect("static pseudo-version base regex is valid")
});

/// Returns true if `version` is a valid semantic version in the Go
/// `vMAJOR.MINOR.PATCH[-prerelease][+build]` form.
pub fn is_valid_semver(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    let rest = rest.strip_suffix("+incompatible").unwrap_or(rest);
    semver::Version::parse(rest).is_ok()
}

/// Returns true if `version` has the shape of a Go pseudo-version.
pub fn is_pseudo_version(version: &str) -> bool {
    PSEUDO_VERSION_RE.is_match(version) || PSEUDO_VERSION_BASE_RE.is_match(version)
}

/// Strips the pseudo-version commit/timestamp suffix, returning the
/// base version the pseudo-version was derived from (e.g.
/// `v1.2.3-0.20200101000000-0123456789ab` -> `v1.2.2` conceptually is
/// handled by the caller; this just removes the encoded suffix so the
/// remaining text can be parsed as a plain semver string).
pub fn base_version_from_pseudo(version: &str) -> Option<String> {
    if !is_pseudo_version(version) {
        return None;
    }
    let idx = version.rfind("-0.")?;
    Some(version[..idx].to_string())
}

/// Returns true if the unescaped version string is valid input to the
/// fetcher: a semver, a pseudo-version, a non-semver revision (branch,
/// tag, or commit hash), or the literal `latest`.
pub fn is_valid_version_grammar(version: &str) -> bool {
    !version.is_empty() && !version.contains('/') && !version.contains("..")
}

/// The three query literals the router explicitly rejects as invalid
/// version specifiers for `.info`/`.mod`/`.zip` requests.
pub fn is_rejected_query_literal(version: &str) -> bool {
    matches!(version, "latest" | "upgrade" | "patch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_plain_semver() {
        assert!(is_valid_semver("v1.2.3"));
        assert!(is_valid_semver("v0.0.0"));
        assert!(!is_valid_semver("1.2.3"));
        assert!(!is_valid_semver("not-a-version"));
    }

    #[test]
    fn recognizes_pseudo_version() {
        assert!(is_pseudo_version("v0.0.0-20191109021931-daa7c04131f5"));
        assert!(is_pseudo_version(
            "v1.2.3-pre.0.20200101000000-0123456789ab"
        ));
        assert!(!is_pseudo_version("v1.2.3"));
        assert!(!is_pseudo_version("v1.2.3-beta.1"));
    }

    #[test]
    fn base_version_strips_suffix() {
        assert_eq!(
            base_version_from_pseudo("v1.2.3-0.20200101000000-0123456789ab"),
            Some("v1.2.3".to_string())
        );
        assert_eq!(base_version_from_pseudo("v1.2.3"), None);
    }

    #[test]
    fn rejected_query_literals() {
        assert!(is_rejected_query_literal("latest"));
        assert!(is_rejected_query_literal("upgrade"));
        assert!(is_rejected_query_literal("patch"));
        assert!(!is_rejected_query_literal("v1.0.0"));
    }

    #[test]
    fn version_grammar_rejects_traversal() {
        assert!(!is_valid_version_grammar("../etc/passwd"));
        assert!(!is_valid_version_grammar(""));
        assert!(is_valid_version_grammar("v1.0.0"));
        assert!(is_valid_version_grammar("main"));
    }
}
