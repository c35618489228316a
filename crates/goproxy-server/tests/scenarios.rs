//! End-to-end scenarios against [`Router`] over a mocked upstream.

use bytes::Bytes;
use goproxy_cache::MemoryCache;
use goproxy_core::config::Environment;
use goproxy_core::context::FetchContext;
use goproxy_core::proxy_list::ProxyList;
use goproxy_fetch::{Fetcher, SubprocessRunner};
use goproxy_server::{Router, ServerConfig};
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use std::sync::Arc;

fn router_for(proxy_spec: &str) -> Router {
    let environment = Environment {
        proxy_list: ProxyList::parse(proxy_spec),
        sumdb: None,
        no_proxy: String::new(),
        no_sumdb: String::new(),
    };
    let fetcher = Fetcher::new(
        environment,
        None,
        Arc::new(SubprocessRunner::default()),
        0,
        None,
    );
    Router::new(
        fetcher,
        Arc::new(MemoryCache::new()),
        None,
        ServerConfig::default(),
    )
}

#[tokio::test]
async fn scenario_1_happy_path_at_latest() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/example.com/@latest")
        .with_status(200)
        .with_body(r#"{"Version":"v1.0.0","Time":"2000-01-01T00:00:00Z"}"#)
        .create_async()
        .await;

    let router = router_for(&server.url());
    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &HeaderMap::new())
        .await;

    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(
        response.headers().get("Cache-Control").unwrap(),
        "public, max-age=60"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body_str = String::from_utf8(body.to_vec()).unwrap();
    assert!(body_str.contains(r#""Version":"v1.0.0""#));
}

#[tokio::test]
async fn scenario_2_fallback_on_404_filters_and_sorts_versions() {
    let mut u1 = mockito::Server::new_async().await;
    let mut u2 = mockito::Server::new_async().await;
    u1.mock("GET", "/example.com/@v/list")
        .with_status(404)
        .create_async()
        .await;
    u2.mock("GET", "/example.com/@v/list")
        .with_status(200)
        .with_body("v1.0.0\nv1.1.0\nv1.1.1-0.20200101000000-0123456789ab\nv1.2.0 foo bar\ninvalid\n")
        .create_async()
        .await;

    let router = router_for(&format!("{},{},direct", u1.url(), u2.url()));
    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/@v/list", &HeaderMap::new())
        .await;

    assert_eq!(response.status(), http::StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "v1.0.0\nv1.1.0\nv1.2.0");
}

#[tokio::test]
async fn scenario_4_off_disables_lookup() {
    let router = router_for("off");
    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &HeaderMap::new())
        .await;

    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "not found: module lookup disabled by GOPROXY=off");
}

#[tokio::test]
async fn scenario_5_invalid_double_escape_rejected() {
    let router = router_for("off");
    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/!!foo/@latest", &HeaderMap::new())
        .await;

    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("Cache-Control").unwrap(),
        "public, max-age=86400"
    );
}

#[tokio::test]
async fn scenario_6_head_parity_with_get() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/example.com/@latest")
        .with_status(200)
        .with_body(r#"{"Version":"v1.0.0","Time":"2000-01-01T00:00:00Z"}"#)
        .create_async()
        .await;

    let router = router_for(&server.url());
    let ctx = FetchContext::new();

    let get_response = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &HeaderMap::new())
        .await;
    let get_headers = get_response.headers().clone();
    let get_status = get_response.status();

    let head_response = router
        .handle(&ctx, &Method::HEAD, "/example.com/@latest", &HeaderMap::new())
        .await;

    assert_eq!(head_response.status(), get_status);
    assert_eq!(head_response.headers(), &get_headers);
    let body = head_response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn disable_module_fetch_header_blocks_fetch_on_cache_miss() {
    let router = router_for("off");
    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &disable_fetch_header())
        .await;
    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.windows(b"temporarily unavailable".len()).any(|w| w == b"temporarily unavailable"));
}

fn disable_fetch_header() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Disable-Module-Fetch", "true".parse().unwrap());
    headers
}

#[tokio::test]
async fn repeat_request_honors_if_none_match() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/example.com/@latest")
        .with_status(200)
        .with_body(r#"{"Version":"v1.0.0","Time":"2000-01-01T00:00:00Z"}"#)
        .create_async()
        .await;

    let router = router_for(&server.url());
    let ctx = FetchContext::new();
    let first = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &HeaderMap::new())
        .await;
    let etag = first.headers().get("ETag").cloned().expect("caching populates an ETag");

    let mut conditional = HeaderMap::new();
    conditional.insert("If-None-Match", etag);
    let second = router
        .handle(&ctx, &Method::GET, "/example.com/@latest", &conditional)
        .await;
    assert_eq!(second.status(), http::StatusCode::NOT_MODIFIED);
    let body = second.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

fn test_zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn zip_download_honors_range_request() {
    let zip_bytes = test_zip_bytes(&[("example.com@v1.0.0/go.mod", b"module example.com\n")]);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/example.com/@v/v1.0.0.info")
        .with_status(200)
        .with_body(r#"{"Version":"v1.0.0","Time":"2000-01-01T00:00:00Z"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/example.com/@v/v1.0.0.mod")
        .with_status(200)
        .with_body("module example.com\n")
        .create_async()
        .await;
    server
        .mock("GET", "/example.com/@v/v1.0.0.zip")
        .with_status(200)
        .with_body(zip_bytes.clone())
        .create_async()
        .await;

    let router = router_for(&server.url());
    let ctx = FetchContext::new();
    let mut headers = HeaderMap::new();
    headers.insert(http::header::RANGE, "bytes=0-3".parse().unwrap());
    let response = router
        .handle(&ctx, &Method::GET, "/example.com/@v/v1.0.0.zip", &headers)
        .await;

    assert_eq!(response.status(), http::StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("Content-Range").unwrap(),
        &format!("bytes 0-3/{}", zip_bytes.len())
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, Bytes::copy_from_slice(&zip_bytes[0..=3]));
}
