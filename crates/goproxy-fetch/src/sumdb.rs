//! Checksum-database client: endpoint resolution plus the
//! transparency-log operations the verifier needs.

use crate::http_getter::HttpGetter;
use goproxy_core::config::{resolve_sumdb_key, SumdbKeySpec};
use goproxy_core::context::FetchContext;
use goproxy_core::error::{Error, Result};
use goproxy_core::proxy_list::ProxyList;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const REROLL_INTERVAL: Duration = Duration::from_secs(10);

/// Resolved endpoint plus the timestamp of the last (successful or
/// failed) resolution attempt, so re-resolution is rate-limited.
struct ResolvedEndpoint {
    url: String,
    resolved_at: Instant,
}

/// Client for a single `GOSUMDB` endpoint.
///
/// Mirrors the shape of the registry clients elsewhere in this corpus:
/// a `reqwest`-backed getter plus a small piece of cached resolution
/// state behind a lock, since re-resolution happens at most once every
/// [`REROLL_INTERVAL`].
pub struct SumdbClient {
    key: SumdbKeySpec,
    proxy_list: ProxyList,
    getter: HttpGetter,
    endpoint: RwLock<Option<ResolvedEndpoint>>,
}

impl SumdbClient {
    /// Builds a client for the given raw `GOSUMDB` value, resolving
    /// through `proxy_list` when the key has no direct URL.
    pub fn new(raw_sumdb: &str, proxy_list: ProxyList) -> Self {
        Self {
            key: resolve_sumdb_key(raw_sumdb),
            proxy_list,
            getter: HttpGetter::new(),
            endpoint: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// `ReadConfig("key")` / `ReadConfig("*/latest")`.
    pub fn read_config(&self, name: &str) -> Result<Vec<u8>> {
        match name {
            "key" => Ok(self.key.verifier_key.clone().into_bytes()),
            "*/latest" => Ok(Vec::new()),
            other => Err(Error::internal(format!("unknown config {other}"))),
        }
    }

    /// `ReadRemote(path)`: GETs `<endpoint>/<path>` against the
    /// resolved endpoint, resolving (or re-resolving) it first.
    pub async fn read_remote(&self, ctx: &FetchContext, path: &str) -> Result<Vec<u8>> {
        let endpoint = self.resolve_endpoint(ctx).await?;
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'));
        let bytes = self.getter.get_bytes(ctx, &url).await?;
        Ok(bytes.to_vec())
    }

    /// The cache collaborator is a no-op: `ReadCache` always
    /// misses, `WriteCache` discards. Exposed for symmetry with the
    /// interface described in the design, even though callers can
    /// simply skip calling it.
    pub fn read_cache(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }

    pub fn write_cache(&self, _name: &str, _data: &[u8]) {}

    async fn resolve_endpoint(&self, ctx: &FetchContext) -> Result<String> {
        if self.key.is_direct_url {
            return Ok(self.key.url.clone());
        }

        if let Some(cached) = self.endpoint.read().unwrap().as_ref() {
            if cached.resolved_at.elapsed() < REROLL_INTERVAL {
                return Ok(cached.url.clone());
            }
        }

        let name = self.key.name.clone();
        let getter = &self.getter;
        let result = self
            .proxy_list
            .walk(
                |proxy| {
                    let probe_url = format!("{}/sumdb/{}/supported", proxy.trim_end_matches('/'), name);
                    async move {
                        getter.get_bytes(ctx, &probe_url).await?;
                        Ok(proxy.trim_end_matches("/supported").to_string())
                    }
                },
                || {
                    let direct = self.key.url.clone();
                    async move { Ok(direct) }
                },
            )
            .await;

        let resolved = match result {
            Ok(url) => url,
            Err(_) => self.key.url.clone(),
        };

        *self.endpoint.write().unwrap() = Some(ResolvedEndpoint {
            url: resolved.clone(),
            resolved_at: Instant::now(),
        });
        Ok(resolved)
    }
}

impl std::fmt::Debug for SumdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SumdbClient").field("name", &self.key.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_config_key_returns_verifier_key() {
        let client = SumdbClient::new("sum.golang.org", ProxyList::parse("off"));
        let bytes = client.read_config("key").unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn read_config_latest_is_empty() {
        let client = SumdbClient::new("sum.golang.org", ProxyList::parse("off"));
        assert_eq!(client.read_config("*/latest").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn read_config_unknown_errors() {
        let client = SumdbClient::new("sum.golang.org", ProxyList::parse("off"));
        assert!(client.read_config("bogus").is_err());
    }

    #[tokio::test]
    async fn direct_url_key_resolves_without_network() {
        let client = SumdbClient::new("sum.golang.google.cn", ProxyList::parse("off"));
        let ctx = FetchContext::new();
        let url = client.resolve_endpoint(&ctx).await.unwrap();
        assert!(url.contains("cache.googleapis.cn"));
    }

    #[tokio::test]
    async fn proxy_resolution_falls_back_to_direct_on_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sumdb/sum.golang.org/supported")
            .with_status(404)
            .create_async()
            .await;
        let proxy_list = ProxyList::parse(&format!("{},direct", server.url()));
        let client = SumdbClient::new("sum.golang.org", proxy_list);
        let ctx = FetchContext::new();
        let url = client.resolve_endpoint(&ctx).await.unwrap();
        assert_eq!(url, "https://sum.golang.org");
    }

    #[tokio::test]
    async fn proxy_resolution_uses_proxy_when_supported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sumdb/sum.golang.org/supported")
            .with_status(200)
            .create_async()
            .await;
        let proxy_list = ProxyList::parse(&format!("{},direct", server.url()));
        let client = SumdbClient::new("sum.golang.org", proxy_list);
        let ctx = FetchContext::new();
        let url = client.resolve_endpoint(&ctx).await.unwrap();
        assert_eq!(url, server.url());
    }
}
