use goproxy_cache::MemoryCache;
use goproxy_core::config::{Environment, RawEnv};
use goproxy_fetch::{Fetcher, SubprocessRunner, SumdbClient};
use goproxy_server::{HttpServer, Router, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_process_env();
    let raw_env = RawEnv::from_process_env();
    let environment = Environment::from_raw(&raw_env, false);

    let fetcher_sumdb = environment
        .sumdb
        .as_ref()
        .map(|raw| SumdbClient::new(raw, environment.proxy_list.clone()));
    let router_sumdb = environment
        .sumdb
        .as_ref()
        .map(|raw| Arc::new(SumdbClient::new(raw, environment.proxy_list.clone())));

    let runner = Arc::new(SubprocessRunner::new(config.go_bin.clone()));
    let fetcher = Fetcher::new(
        environment,
        fetcher_sumdb,
        runner,
        config.max_direct_fetches,
        config.temp_dir.clone(),
    );

    let cache = Arc::new(MemoryCache::new());
    let router = Router::new(fetcher, cache, router_sumdb, config.clone());

    let server = HttpServer::new(router, config);
    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
