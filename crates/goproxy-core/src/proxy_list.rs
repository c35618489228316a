//! Proxy walker: parses the `GOPROXY`-style separator-aware entry
//! list and drives fall-through across it.

use crate::error::{Error, Result};
use std::fmt;

const DEFAULT_PROXY_LIST: &str = "https://proxy.golang.org,direct";

/// One entry in a proxy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// An upstream proxy base URL.
    Url(String),
    /// Fetch directly via the local toolchain.
    Direct,
    /// Module lookup is disabled entirely.
    Off,
}

/// Whether a step in the walk falls through to the next entry on any
/// error, or only on a not-found-class error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallThrough {
    /// `,` (or no separator): only not-found errors continue the walk.
    OnNotFound,
    /// `|`: any error (other than cancellation/deadline) continues the walk.
    OnAnyError,
}

/// A normalized, ordered proxy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyList {
    steps: Vec<(Entry, FallThrough)>,
}

impl ProxyList {
    /// Parses and normalizes a raw `GOPROXY` string.
    ///
    /// Normalization: trailing separators trimmed, entries after a
    /// terminal `direct`/`off` sentinel discarded, an effectively-empty
    /// list collapses to `off`, and an unset/empty string defaults to
    /// `https://proxy.golang.org,direct`.
    pub fn parse(raw: &str) -> Self {
        let raw = if raw.trim().is_empty() {
            DEFAULT_PROXY_LIST
        } else {
            raw
        };

        let mut steps = Vec::new();
        let mut terminated = false;
        for token in tokenize(raw) {
            if terminated {
                break;
            }
            let (text, fall_through) = token;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let entry = match text {
                "direct" => Entry::Direct,
                "off" => Entry::Off,
                url => Entry::Url(url.to_string()),
            };
            if matches!(entry, Entry::Direct | Entry::Off) {
                terminated = true;
            }
            steps.push((entry, fall_through));
        }

        if steps.is_empty() {
            steps.push((Entry::Off, FallThrough::OnNotFound));
        }

        Self { steps }
    }

    /// The ordered `(entry, fall_through_policy)` pairs.
    pub fn steps(&self) -> &[(Entry, FallThrough)] {
        &self.steps
    }

    /// Drives `probe` across the list left-to-right, honoring
    /// fall-through policy per entry, and invoking `direct` when the
    /// walk reaches a `direct` sentinel.
    ///
    /// `probe(url) -> Result<T>` is called once per `Entry::Url` step.
    /// `direct()` is called (at most once) when the walk reaches
    /// `Entry::Direct`. `Entry::Off` terminates the walk with a
    /// not-found error carrying the GOPROXY=off message.
    ///
    /// Returns the first success; otherwise the *last* not-found
    /// encountered, or the first hard error if no not-found was ever
    /// seen.
    pub async fn walk<T, P, D, Pf, Df>(&self, mut probe: P, mut direct: D) -> Result<T>
    where
        P: FnMut(&str) -> Pf,
        Pf: std::future::Future<Output = Result<T>>,
        D: FnMut() -> Df,
        Df: std::future::Future<Output = Result<T>>,
    {
        let mut last_not_found: Option<Error> = None;

        for (entry, fall_through) in &self.steps {
            match entry {
                Entry::Url(url) => match probe(url).await {
                    Ok(value) => return Ok(value),
                    Err(err) if is_cancellation(&err) => return Err(err),
                    Err(err) if err.is_not_found() => {
                        last_not_found = Some(err);
                        continue;
                    }
                    Err(err) => match fall_through {
                        FallThrough::OnAnyError => {
                            last_not_found = Some(err);
                            continue;
                        }
                        FallThrough::OnNotFound => return Err(err),
                    },
                },
                Entry::Direct => return direct().await,
                Entry::Off => {
                    return Err(Error::not_found(
                        "module lookup disabled by GOPROXY=off",
                    ));
                }
            }
        }

        Err(last_not_found.unwrap_or_else(|| Error::not_found("no proxies configured")))
    }
}

impl fmt::Display for ProxyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .steps
            .iter()
            .map(|(entry, _)| match entry {
                Entry::Url(u) => u.clone(),
                Entry::Direct => "direct".to_string(),
                Entry::Off => "off".to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

fn is_cancellation(err: &Error) -> bool {
    matches!(err, Error::Cancelled | Error::DeadlineExceeded)
}

/// Splits `raw` on `,` and `|`, remembering which separator followed
/// each token so the walker knows its fall-through policy. The
/// separator following the *last* token in the list is irrelevant (no
/// further entry to fall through to), so it defaults to `OnNotFound`.
fn tokenize(raw: &str) -> Vec<(&str, FallThrough)> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b',' || *b == b'|' {
            let fall_through = if *b == b'|' {
                FallThrough::OnAnyError
            } else {
                FallThrough::OnNotFound
            };
            out.push((&raw[start..i], fall_through));
            start = i + 1;
        }
    }
    out.push((&raw[start..], FallThrough::OnNotFound));
    out
}
