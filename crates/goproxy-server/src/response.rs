//! Response assembly: consistent content-type, cache-control,
//! conditional/range negotiation, and error-to-status mapping.

use bytes::Bytes;
use chrono::DateTime;
use goproxy_cache::CachedObject;
use goproxy_core::error::{Error, NotFoundKind};
use goproxy_core::model::Operation;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;

/// `Cache-Control` policy for a response.
#[derive(Debug, Clone, Copy)]
pub enum CacheControl {
    PublicMaxAge(u64),
    NoStore,
}

impl CacheControl {
    fn header_value(self) -> &'static str {
        match self {
            Self::PublicMaxAge(60) => "public, max-age=60",
            Self::PublicMaxAge(600) => "public, max-age=600",
            Self::PublicMaxAge(86400) => "public, max-age=86400",
            Self::PublicMaxAge(604_800) => "public, max-age=604800",
            Self::PublicMaxAge(_) => "public, max-age=60",
            Self::NoStore => "must-revalidate, no-cache, no-store",
        }
    }
}

/// Cache-control for a successful response to `op`.
pub const fn success_cache_control(op: Operation) -> CacheControl {
    match op {
        Operation::Query | Operation::List => CacheControl::PublicMaxAge(60),
        Operation::Download => CacheControl::PublicMaxAge(604_800),
    }
}

/// Cache-control for a not-found response arising while serving `op`:
/// 60s for QUERY/LIST, 600s for DOWNLOAD, overridden by
/// `must-revalidate...` for upstream/timeout subclasses (those are more
/// likely to resolve differently on retry).
fn not_found_cache_control(op: Operation, kind: NotFoundKind) -> CacheControl {
    match kind {
        NotFoundKind::BadUpstream | NotFoundKind::FetchTimeout => CacheControl::NoStore,
        NotFoundKind::Plain => match op {
            Operation::Query | Operation::List => CacheControl::PublicMaxAge(60),
            Operation::Download => CacheControl::PublicMaxAge(600),
        },
    }
}

/// A successful `200` with the appropriate `Content-Type`/`Cache-Control`.
pub fn ok(content_type: &str, cache_control: CacheControl, body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Cache-Control", cache_control.header_value())
        .header("Content-Length", body.len().to_string())
        .body(Full::new(body))
        .expect("static header values are always valid")
}

/// Serves a cached object, negotiating conditional and range requests
/// against whatever validators it carries.
///
/// `cached.etag()`/`cached.modified_at` become `ETag`/`Last-Modified`
/// on the `200`; a matching `If-None-Match`/`If-Modified-Since` on
/// `headers` downgrades that to a bodyless `304`; otherwise a `Range`
/// header that fits within the body downgrades it to a `206` carrying
/// just the requested slice. An object's bytes are always fully
/// resident in memory here, so there's no "can't seek" case to fall
/// back from.
pub fn serve(
    content_type: &str,
    cache_control: CacheControl,
    cached: &CachedObject,
    headers: &HeaderMap,
) -> Response<Full<Bytes>> {
    let etag = cached.etag();
    let last_modified = cached.modified_at.map(|when| when.to_rfc2822());

    if is_not_modified(etag.as_deref(), last_modified.as_deref(), headers) {
        return not_modified(cache_control, etag.as_deref(), last_modified.as_deref());
    }

    if let Some(range) = range_header(headers) {
        if let Some((start, end)) = resolve_range(range, cached.data.len() as u64) {
            return partial_content(
                content_type,
                cache_control,
                &cached.data,
                start,
                end,
                etag.as_deref(),
                last_modified.as_deref(),
            );
        }
    }

    let mut response = ok(content_type, cache_control, cached.data.clone());
    if let Some(etag) = etag {
        response
            .headers_mut()
            .insert("ETag", etag.parse().expect("quoted base64 is a valid header value"));
    }
    if let Some(last_modified) = last_modified {
        response.headers_mut().insert(
            "Last-Modified",
            last_modified.parse().expect("rfc2822 is a valid header value"),
        );
    }
    response
}

fn is_not_modified(etag: Option<&str>, last_modified: Option<&str>, headers: &HeaderMap) -> bool {
    if let (Some(etag), Some(candidate)) = (etag, headers.get("If-None-Match")) {
        if candidate.as_bytes() == etag.as_bytes() {
            return true;
        }
    }
    if let (Some(last_modified), Some(since)) = (
        last_modified,
        headers.get("If-Modified-Since").and_then(|v| v.to_str().ok()),
    ) {
        if let (Ok(last_modified), Ok(since)) = (
            DateTime::parse_from_rfc2822(last_modified),
            DateTime::parse_from_rfc2822(since),
        ) {
            if last_modified <= since {
                return true;
            }
        }
    }
    false
}

fn not_modified(
    cache_control: CacheControl,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header("Cache-Control", cache_control.header_value());
    if let Some(etag) = etag {
        builder = builder.header("ETag", etag);
    }
    if let Some(last_modified) = last_modified {
        builder = builder.header("Last-Modified", last_modified);
    }
    builder
        .body(Full::new(Bytes::new()))
        .expect("static header values are always valid")
}

/// Parses a single-range `Range: bytes=start-end` request header.
///
/// Go-proxy style: both the open-ended (`bytes=500-`) and suffix
/// (`bytes=-500`) forms are accepted. Multi-range requests and anything
/// else malformed are treated as absent — the caller falls back to
/// serving the full body rather than answering `416`.
fn range_header(headers: &HeaderMap) -> Option<(Option<u64>, Option<u64>)> {
    let value = headers.get(http::header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start = if start.is_empty() { None } else { start.parse().ok() };
    let end = if end.is_empty() { None } else { end.parse().ok() };
    if start.is_none() && end.is_none() {
        return None;
    }
    Some((start, end))
}

/// Resolves a parsed range against the actual body length, returning
/// `None` (fall back to the full body) for anything out of bounds.
fn resolve_range(range: (Option<u64>, Option<u64>), len: u64) -> Option<(u64, u64)> {
    if len == 0 {
        return None;
    }
    let (start, end) = match range {
        (Some(start), Some(end)) => (start, end.min(len - 1)),
        (Some(start), None) => (start, len - 1),
        (None, Some(suffix_len)) => {
            let start = len.saturating_sub(suffix_len.max(1));
            (start, len - 1)
        }
        (None, None) => return None,
    };
    if start > end || start >= len {
        return None;
    }
    Some((start, end))
}

fn partial_content(
    content_type: &str,
    cache_control: CacheControl,
    data: &Bytes,
    start: u64,
    end: u64,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Response<Full<Bytes>> {
    let slice = data.slice(start as usize..=end as usize);
    let mut builder = Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header("Content-Type", content_type)
        .header("Cache-Control", cache_control.header_value())
        .header("Content-Length", slice.len().to_string())
        .header("Content-Range", format!("bytes {start}-{end}/{}", data.len()));
    if let Some(etag) = etag {
        builder = builder.header("ETag", etag);
    }
    if let Some(last_modified) = last_modified {
        builder = builder.header("Last-Modified", last_modified);
    }
    builder
        .body(Full::new(slice))
        .expect("static header values are always valid")
}

/// Maps a fetcher/router [`Error`] to its HTTP response.
pub fn from_error(err: &Error, op: Operation) -> Response<Full<Bytes>> {
    match err {
        Error::NotFound { message, kind } => {
            not_found(&format!("not found: {message}"), not_found_cache_control(op, *kind))
        }
        Error::Internal(_) => internal_server_error(),
        Error::Cancelled | Error::DeadlineExceeded => connection_closed(),
    }
}

/// A bare `404` for conditions the router rejects before ever calling
/// the fetcher (malformed path, bad method's sibling cases, etc.).
pub fn not_found(message: &str, cache_control: CacheControl) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Cache-Control", cache_control.header_value())
        .body(Full::new(Bytes::from(message.to_string())))
        .expect("static header values are always valid")
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Cache-Control", CacheControl::PublicMaxAge(86400).header_value())
        .body(Full::new(Bytes::from_static(b"method not allowed")))
        .expect("static header values are always valid")
}

pub fn internal_server_error() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(b"internal server error")))
        .expect("static header values are always valid")
}

/// Cancellation/deadline-exceeded carries no response-body requirement:
/// close the connection with an empty body rather than pretend success
/// or invent an error the client didn't ask about.
fn connection_closed() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
        .headers_mut()
        .insert("Connection", "close".parse().expect("valid header value"));
    response
}

/// Strips the response body for `HEAD` requests while preserving every
/// header, including `Content-Length`.
pub fn to_head(response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_cache_control_matches_op_class() {
        assert!(matches!(
            success_cache_control(Operation::Query),
            CacheControl::PublicMaxAge(60)
        ));
        assert!(matches!(
            success_cache_control(Operation::Download),
            CacheControl::PublicMaxAge(604_800)
        ));
    }

    #[test]
    fn not_found_plain_uses_op_specific_ttl() {
        assert!(matches!(
            not_found_cache_control(Operation::Query, NotFoundKind::Plain),
            CacheControl::PublicMaxAge(60)
        ));
        assert!(matches!(
            not_found_cache_control(Operation::Download, NotFoundKind::Plain),
            CacheControl::PublicMaxAge(600)
        ));
    }

    #[test]
    fn bad_upstream_and_timeout_force_no_store() {
        assert!(matches!(
            not_found_cache_control(Operation::Download, NotFoundKind::BadUpstream),
            CacheControl::NoStore
        ));
        assert!(matches!(
            not_found_cache_control(Operation::Query, NotFoundKind::FetchTimeout),
            CacheControl::NoStore
        ));
    }

    #[test]
    fn from_error_maps_not_found_to_404() {
        let err = Error::not_found("nope");
        let response = from_error(&err, Operation::Query);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn from_error_maps_internal_to_500() {
        let err = Error::internal("boom");
        let response = from_error(&err, Operation::Query);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn to_head_empties_body_but_keeps_headers() {
        let response = ok(
            "application/json; charset=utf-8",
            CacheControl::PublicMaxAge(60),
            Bytes::from_static(b"{}"),
        );
        let head = to_head(response);
        assert_eq!(head.headers().get("Content-Length").unwrap(), "2");
    }

    #[test]
    fn serve_sets_etag_and_last_modified_when_present() {
        let cached = CachedObject::new(Bytes::from_static(b"hello"))
            .with_checksum([1u8; 32])
            .with_modified_at(chrono::Utc::now());
        let response = serve(
            "text/plain; charset=utf-8",
            CacheControl::PublicMaxAge(60),
            &cached,
            &HeaderMap::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("ETag"));
        assert!(response.headers().contains_key("Last-Modified"));
    }

    #[test]
    fn serve_matching_if_none_match_yields_304() {
        let cached = CachedObject::new(Bytes::from_static(b"hello")).with_checksum([1u8; 32]);
        let etag = cached.etag().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("If-None-Match", etag.parse().unwrap());
        let response = serve(
            "text/plain; charset=utf-8",
            CacheControl::PublicMaxAge(60),
            &cached,
            &headers,
        );
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(!response.headers().contains_key("Content-Length"));
    }

    #[test]
    fn serve_mismatched_if_none_match_serves_full_body() {
        let cached = CachedObject::new(Bytes::from_static(b"hello")).with_checksum([1u8; 32]);
        let mut headers = HeaderMap::new();
        headers.insert("If-None-Match", "\"not-the-etag\"".parse().unwrap());
        let response = serve(
            "text/plain; charset=utf-8",
            CacheControl::PublicMaxAge(60),
            &cached,
            &headers,
        );
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn serve_honors_open_ended_range() {
        let cached = CachedObject::new(Bytes::from_static(b"0123456789"));
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RANGE, "bytes=5-".parse().unwrap());
        let response = serve(
            "application/zip",
            CacheControl::PublicMaxAge(604_800),
            &cached,
            &headers,
        );
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get("Content-Range").unwrap(),
            "bytes 5-9/10"
        );
    }

    #[test]
    fn serve_honors_suffix_range() {
        let cached = CachedObject::new(Bytes::from_static(b"0123456789"));
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RANGE, "bytes=-3".parse().unwrap());
        let response = serve(
            "application/zip",
            CacheControl::PublicMaxAge(604_800),
            &cached,
            &headers,
        );
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get("Content-Range").unwrap(),
            "bytes 7-9/10"
        );
    }

    #[test]
    fn serve_ignores_multi_range_and_serves_full_body() {
        let cached = CachedObject::new(Bytes::from_static(b"0123456789"));
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RANGE, "bytes=0-1,3-4".parse().unwrap());
        let response = serve(
            "application/zip",
            CacheControl::PublicMaxAge(604_800),
            &cached,
            &headers,
        );
        assert_eq!(response.status(), StatusCode::OK);
    }
}
