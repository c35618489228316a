//! Glob matcher for `GONOPROXY`/`GONOSUMDB`/`GOPRIVATE` module-path
//! prefix lists.
//!
//! Each entry is a `path.Match`-style glob over a fixed number of
//! `/`-delimited path segments; a target matches if the corresponding
//! prefix of its own segments (truncated to the glob's segment count)
//! matches the glob pattern segment-by-segment. Malformed or empty
//! globs are ignored rather than treated as errors, matching the
//! "private by typo" footgun the Go toolchain itself tolerates.

/// Checks whether any glob in the comma-separated `globs` list matches
/// `target`.
pub fn globs_match(globs: &str, target: &str) -> bool {
    globs
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .any(|glob| glob_match_one(glob, target))
}

fn glob_match_one(glob: &str, target: &str) -> bool {
    let glob_segments: Vec<&str> = glob.split('/').collect();
    let target_segments: Vec<&str> = target.split('/').collect();
    if target_segments.len() < glob_segments.len() {
        return false;
    }
    glob_segments
        .iter()
        .zip(target_segments.iter())
        .all(|(pattern, segment)| segment_match(pattern, segment))
}

/// `path.Match`-style single-segment match: `*` matches any run of
/// non-`/` characters, `?` matches exactly one, everything else is
/// literal. Character classes (`[...]`) are not supported — the
/// module-path globs this crate consumes never use them in practice,
/// and an unsupported pattern simply never matches (malformed globs
/// are ignored rather than rejected).
fn segment_match(pattern: &str, segment: &str) -> bool {
    fn go(pattern: &[u8], segment: &[u8]) -> bool {
        match (pattern.first(), segment.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                (0..=segment.len()).any(|i| go(&pattern[1..], &segment[i..]))
            }
            (Some(b'?'), Some(_)) => go(&pattern[1..], &segment[1..]),
            (Some(p), Some(s)) if p == s => go(&pattern[1..], &segment[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), segment.as_bytes())
}
