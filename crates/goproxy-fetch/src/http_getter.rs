//! Retrying HTTP GET with full-jitter exponential backoff.

use bytes::Bytes;
use goproxy_core::context::FetchContext;
use goproxy_core::error::{Error, Result};
use goproxy_core::path::redact;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const MAX_ATTEMPTS: u32 = 10;
const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// How a non-2xx response or network error should be handled by the
/// retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Retry the request.
    Transient,
    /// Retry, and treat as a fetch-timeout if retries are exhausted.
    Timeout,
    /// Stop immediately; not a retriable condition.
    Permanent,
}

/// A minimal HTTP GET client with the proxy fetcher's retry policy.
///
/// Mirrors the shape of the registry clients elsewhere in this corpus
/// (a thin wrapper around a shared `reqwest::Client`), but centralizes
/// retry/backoff/status-classification so every upstream call —
/// module-proxy GETs and checksum-DB GETs alike — gets the same
/// behavior.
#[derive(Debug, Clone)]
pub struct HttpGetter {
    client: reqwest::Client,
}

impl HttpGetter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("goproxy-rs/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("reqwest client builder with only default options never fails"),
        }
    }

    #[cfg(test)]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GETs `url`, returning the full response body.
    pub async fn get_bytes(&self, ctx: &FetchContext, url: &str) -> Result<Bytes> {
        self.get_with_retry(ctx, url).await
    }

    /// GETs `url` and writes the body to a freshly created temp file
    /// inside `dir`, returning its path. On any error the temp file is
    /// removed.
    pub async fn get_to_temp_file(
        &self,
        ctx: &FetchContext,
        url: &str,
        dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf> {
        let path = dir.join(file_name);
        let data = self.get_with_retry(ctx, url).await?;
        match write_file(&path, &data).await {
            Ok(()) => Ok(path),
            Err(err) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(err)
            }
        }
    }

    async fn get_with_retry(&self, ctx: &FetchContext, url: &str) -> Result<Bytes> {
        let mut attempt = 0u32;
        loop {
            ctx.check()?;
            attempt += 1;
            match self.try_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err((disposition, err)) => {
                    if disposition == Disposition::Permanent || attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    tracing::debug!(
                        url = %redact(url),
                        attempt,
                        "transient failure, retrying"
                    );
                    let delay = full_jitter_backoff(attempt);
                    ctx.sleep(delay).await?;
                }
            }
        }
    }

    async fn try_once(&self, url: &str) -> std::result::Result<Bytes, (Disposition, Error)> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => return Err(classify_network_error(url, &err)),
        };

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map_err(|err| classify_network_error(url, &err));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(url, status.as_u16(), &body))
    }
}

impl Default for HttpGetter {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::internal(e.to_string()))?;
    file.write_all(data)
        .await
        .map_err(|e| Error::internal(e.to_string()))
}

fn classify_status(url: &str, status: u16, body: &str) -> (Disposition, Error) {
    match status {
        400 | 404 | 410 => (
            Disposition::Permanent,
            Error::not_found(body.trim().to_string()),
        ),
        429 | 500 | 502 | 503 => (
            Disposition::Transient,
            Error::bad_upstream(format!("GET {}: {status}: {body}", redact(url))),
        ),
        504 => (
            Disposition::Timeout,
            Error::fetch_timeout(format!("GET {}: {status}: {body}", redact(url))),
        ),
        _ => (
            Disposition::Permanent,
            Error::internal(format!("GET {}: {status}: {body}", redact(url))),
        ),
    }
}

fn classify_network_error(url: &str, err: &reqwest::Error) -> (Disposition, Error) {
    if err.is_timeout() {
        return (
            Disposition::Timeout,
            Error::fetch_timeout(format!("GET {}: {err}", redact(url))),
        );
    }
    // Connection-refused/reset and similar transport errors are worth
    // retrying; a malformed URL/builder error is not.
    if err.is_builder() || err.is_redirect() {
        return (
            Disposition::Permanent,
            Error::internal(format!("GET {}: {err}", redact(url))),
        );
    }
    (
        Disposition::Transient,
        Error::internal(format!("GET {}: {err}", redact(url))),
    )
}

/// `sleep = random(0, min(cap, base * 2^attempt))`.
fn full_jitter_backoff(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(MAX_BACKOFF);
    let millis = capped.as_millis().max(1) as u64;
    let jittered = rand::thread_rng().gen_range(0..=millis);
    Duration::from_millis(jittered)
}
