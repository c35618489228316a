//! Request router: decodes module-proxy URLs, dispatches to the
//! fetcher through the cache, and writes HTTP responses.

use crate::config::ServerConfig;
use crate::response::{self, CacheControl};
use bytes::Bytes;
use goproxy_cache::{Cache, CachedObject};
use goproxy_core::context::FetchContext;
use goproxy_core::model::{self, Operation};
use goproxy_core::path;
use goproxy_core::version;
use goproxy_fetch::{Fetcher, SumdbClient};
use http::{HeaderMap, Method, Response};
use http_body_util::Full;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Everything needed to answer one inbound request.
pub struct Router {
    fetcher: Fetcher,
    cache: Arc<dyn Cache>,
    sumdb: Option<Arc<SumdbClient>>,
    config: ServerConfig,
}

/// How the remainder of the path (after prefix-stripping) was classified.
enum Suffix<'a> {
    Latest,
    List,
    Info(&'a str),
    Mod(&'a str),
    Zip(&'a str),
}

enum ParsedRequest {
    Sumdb { name: String, sub_path: String },
    Module {
        module_path: String,
        version: String,
        op: Operation,
        /// The exact escaped remainder, used verbatim as the cache key.
        cache_name: String,
        escaped_path: String,
        escaped_version: String,
    },
}

impl Router {
    pub fn new(
        fetcher: Fetcher,
        cache: Arc<dyn Cache>,
        sumdb: Option<Arc<SumdbClient>>,
        config: ServerConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            sumdb,
            config,
        }
    }

    /// Handles one request; never panics on malformed input.
    pub async fn handle(
        &self,
        ctx: &FetchContext,
        method: &Method,
        raw_path: &str,
        headers: &HeaderMap,
    ) -> Response<Full<Bytes>> {
        if *method != Method::GET && *method != Method::HEAD {
            return response::method_not_allowed();
        }

        let response = match self.route(ctx, raw_path, headers).await {
            Ok(response) => response,
            Err(rejection) => rejection.into_response(),
        };

        if *method == Method::HEAD {
            response::to_head(response)
        } else {
            response
        }
    }

    async fn route(
        &self,
        ctx: &FetchContext,
        raw_path: &str,
        headers: &HeaderMap,
    ) -> Result<Response<Full<Bytes>>, Rejection> {
        let parsed = parse_path(raw_path, self.config.path_prefix.as_deref())?;

        match parsed {
            ParsedRequest::Sumdb { name, sub_path } => self.serve_sumdb(ctx, &name, &sub_path).await,
            ParsedRequest::Module {
                module_path,
                version,
                op,
                cache_name,
                escaped_path,
                escaped_version,
            } => {
                self.serve_module(
                    ctx,
                    &module_path,
                    &version,
                    op,
                    &cache_name,
                    &escaped_path,
                    &escaped_version,
                    headers,
                )
                .await
            }
        }
    }

    async fn serve_sumdb(
        &self,
        ctx: &FetchContext,
        name: &str,
        sub_path: &str,
    ) -> Result<Response<Full<Bytes>>, Rejection> {
        let Some(sumdb) = &self.sumdb else {
            return Err(Rejection::NotFound);
        };
        if sumdb.name() != name && !self.config.proxied_sumdbs.iter().any(|n| n == name) {
            return Err(Rejection::NotFound);
        }
        match sumdb.read_remote(ctx, sub_path).await {
            Ok(bytes) => Ok(response::ok(
                "text/plain; charset=utf-8",
                CacheControl::PublicMaxAge(3600),
                Bytes::from(bytes),
            )),
            Err(err) => Ok(response::from_error(&err, Operation::Query)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn serve_module(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        version: &str,
        op: Operation,
        cache_name: &str,
        escaped_path: &str,
        escaped_version: &str,
        headers: &HeaderMap,
    ) -> Result<Response<Full<Bytes>>, Rejection> {
        if let Some(cached) = self.cache.get(cache_name).await.unwrap_or(None) {
            return Ok(cached_response(op, &cached, headers));
        }

        if disable_fetch_requested(headers) && self.config.disable_fetch_header_enabled {
            return Ok(response::not_found(
                "not found: temporarily unavailable",
                CacheControl::NoStore,
            ));
        }

        match op {
            Operation::Query => match self.fetcher.query(ctx, module_path, version).await {
                Ok((resolved_version, time)) => {
                    let body = model::marshal_info(&resolved_version, time)
                        .map_err(|_| Rejection::Internal)?;
                    let bytes = Bytes::from(body);
                    let cached = CachedObject::new(bytes.clone()).with_checksum(sha256(&bytes));
                    self.cache.put(cache_name, cached.clone()).await.ok();
                    Ok(response::serve(
                        op.query_list_mime(),
                        response::success_cache_control(op),
                        &cached,
                        headers,
                    ))
                }
                Err(err) => Ok(response::from_error(&err, op)),
            },
            Operation::List => match self.fetcher.list(ctx, module_path).await {
                Ok(versions) => {
                    let bytes = Bytes::from(versions.join("\n"));
                    let cached = CachedObject::new(bytes.clone()).with_checksum(sha256(&bytes));
                    self.cache.put(cache_name, cached.clone()).await.ok();
                    Ok(response::serve(
                        op.query_list_mime(),
                        response::success_cache_control(op),
                        &cached,
                        headers,
                    ))
                }
                Err(err) => Ok(response::from_error(&err, op)),
            },
            Operation::Download => {
                match self.fetcher.download(ctx, module_path, version).await {
                    Ok(outcome) => {
                        self.cache_download_artifacts(
                            &outcome,
                            escaped_path,
                            escaped_version,
                        )
                        .await;
                        let (content_type, path) = match cache_name.rsplit('.').next() {
                            Some("info") => (
                                "application/json; charset=utf-8",
                                outcome.result.info_path.as_deref(),
                            ),
                            Some("mod") => ("text/plain; charset=utf-8", outcome.result.mod_path.as_deref()),
                            Some("zip") => ("application/zip", outcome.result.zip_path.as_deref()),
                            _ => return Err(Rejection::NotFound),
                        };
                        let path = path.ok_or(Rejection::Internal)?;
                        let data = tokio::fs::read(path).await.map_err(|_| Rejection::Internal)?;
                        let bytes = Bytes::from(data);
                        let mut cached = CachedObject::new(bytes.clone()).with_checksum(sha256(&bytes));
                        if let Some(time) = outcome.result.time {
                            cached = cached.with_modified_at(time);
                        }
                        Ok(response::serve(
                            content_type,
                            response::success_cache_control(op),
                            &cached,
                            headers,
                        ))
                    }
                    Err(err) => Ok(response::from_error(&err, op)),
                }
            }
        }
    }

    async fn cache_download_artifacts(
        &self,
        outcome: &goproxy_fetch::DownloadOutcome,
        escaped_path: &str,
        escaped_version: &str,
    ) {
        let entries = [
            ("info", outcome.result.info_path.as_deref()),
            ("mod", outcome.result.mod_path.as_deref()),
            ("zip", outcome.result.zip_path.as_deref()),
        ];
        for (suffix, path) in entries {
            let Some(path) = path else { continue };
            let Ok(data) = tokio::fs::read(path).await else { continue };
            let bytes = Bytes::from(data);
            let name = format!("{escaped_path}/@v/{escaped_version}.{suffix}");
            let checksum = sha256(&bytes);
            let mut object = CachedObject::new(bytes).with_checksum(checksum);
            if let Some(time) = outcome.result.time {
                object = object.with_modified_at(time);
            }
            self.cache.put(&name, object).await.ok();
        }
    }
}

fn sha256(bytes: &Bytes) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Whether the caller asked to skip a network fetch on a cache miss via
/// the `Disable-Module-Fetch` request header.
fn disable_fetch_requested(headers: &HeaderMap) -> bool {
    headers
        .get("Disable-Module-Fetch")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn cached_response(op: Operation, cached: &CachedObject, headers: &HeaderMap) -> Response<Full<Bytes>> {
    let content_type = match op {
        Operation::Query => op.query_list_mime(),
        Operation::List => op.query_list_mime(),
        Operation::Download => "application/octet-stream",
    };
    response::serve(content_type, response::success_cache_control(op), cached, headers)
}

enum Rejection {
    NotFound,
    Internal,
}

impl Rejection {
    fn into_response(self) -> Response<Full<Bytes>> {
        match self {
            Self::NotFound => response::not_found("not found", CacheControl::PublicMaxAge(86400)),
            Self::Internal => response::internal_server_error(),
        }
    }
}

fn parse_path(raw_path: &str, prefix: Option<&str>) -> Result<ParsedRequest, Rejection> {
    let decoded = percent_decode_str(raw_path)
        .decode_utf8()
        .map_err(|_| Rejection::NotFound)?;

    if !decoded.starts_with('/') || decoded.len() <= 1 || decoded.ends_with('/') {
        return Err(Rejection::NotFound);
    }
    if decoded.split('/').any(|segment| segment == "..") {
        return Err(Rejection::NotFound);
    }

    let mut remainder = decoded.trim_start_matches('/');
    if let Some(prefix) = prefix {
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            remainder = remainder
                .strip_prefix(prefix)
                .and_then(|r| r.strip_prefix('/'))
                .ok_or(Rejection::NotFound)?;
        }
    }

    if let Some(sumdb_rest) = remainder.strip_prefix("sumdb/") {
        let (name, sub_path) = sumdb_rest.split_once('/').ok_or(Rejection::NotFound)?;
        return Ok(ParsedRequest::Sumdb {
            name: name.to_string(),
            sub_path: sub_path.to_string(),
        });
    }

    let cache_name = remainder.to_string();
    let (escaped_path, suffix) = split_suffix(remainder).ok_or(Rejection::NotFound)?;
    let module_path = path::unescape(escaped_path).map_err(|_| Rejection::NotFound)?;

    let (op, version, escaped_version) = match suffix {
        Suffix::Latest => (Operation::Query, "latest".to_string(), "latest".to_string()),
        Suffix::List => (Operation::List, "latest".to_string(), "latest".to_string()),
        Suffix::Info(raw_version) => {
            if version::is_rejected_query_literal(raw_version) {
                return Err(Rejection::NotFound);
            }
            let unescaped = path::unescape(raw_version).map_err(|_| Rejection::NotFound)?;
            let op = if version::is_valid_semver(&unescaped) {
                Operation::Download
            } else {
                Operation::Query
            };
            (op, unescaped, raw_version.to_string())
        }
        Suffix::Mod(raw_version) | Suffix::Zip(raw_version) => {
            if version::is_rejected_query_literal(raw_version) {
                return Err(Rejection::NotFound);
            }
            let unescaped = path::unescape(raw_version).map_err(|_| Rejection::NotFound)?;
            if !version::is_valid_semver(&unescaped) {
                return Err(Rejection::NotFound);
            }
            (Operation::Download, unescaped, raw_version.to_string())
        }
    };

    Ok(ParsedRequest::Module {
        module_path,
        version,
        op,
        cache_name,
        escaped_path: escaped_path.to_string(),
        escaped_version,
    })
}

fn split_suffix(remainder: &str) -> Option<(&str, Suffix<'_>)> {
    if let Some(module_path) = remainder.strip_suffix("/@latest") {
        return Some((module_path, Suffix::Latest));
    }
    if let Some(module_path) = remainder.strip_suffix("/@v/list") {
        return Some((module_path, Suffix::List));
    }
    let idx = remainder.find("/@v/")?;
    let (module_path, rest) = remainder.split_at(idx);
    let rest = &rest["/@v/".len()..];
    if let Some(v) = rest.strip_suffix(".info") {
        return Some((module_path, Suffix::Info(v)));
    }
    if let Some(v) = rest.strip_suffix(".mod") {
        return Some((module_path, Suffix::Mod(v)));
    }
    if let Some(v) = rest.strip_suffix(".zip") {
        return Some((module_path, Suffix::Zip(v)));
    }
    None
}
