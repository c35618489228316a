//! The server's own configuration object, layered on top of the
//! environment-derived [`goproxy_core::config::Environment`].

use std::net::SocketAddr;
use std::path::PathBuf;

/// Knobs controlling the HTTP listener and direct-fetch subprocess
/// pool, separate from the environment and cache implementation (the
/// environment is parsed once at startup; the cache is chosen by the
/// binary).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Path to the `go` binary invoked by the direct fetch path.
    pub go_bin: String,
    /// Concurrent direct-path subprocess invocations allowed; `0` = unbounded.
    pub max_direct_fetches: usize,
    /// Base directory for per-request temp directories; `None` uses the
    /// platform default.
    pub temp_dir: Option<PathBuf>,
    /// URL path prefix stripped before module-path parsing, e.g. `/mod`.
    pub path_prefix: Option<String>,
    /// `sumdb` names this server will proxy verbatim under `/sumdb/<name>/...`.
    pub proxied_sumdbs: Vec<String>,
    /// Whether `Disable-Module-Fetch: true` is honored.
    pub disable_fetch_header_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().expect("valid default bind addr"),
            go_bin: "go".to_string(),
            max_direct_fetches: 0,
            temp_dir: None,
            path_prefix: None,
            proxied_sumdbs: Vec::new(),
            disable_fetch_header_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Builds config from the process environment, falling back to
    /// [`Default`] for anything unset.
    ///
    /// `GOPROXY_ADDR` overrides the bind address; `GOPROXY_GOBIN`
    /// overrides the toolchain binary; `GOPROXY_MAX_DIRECT_FETCHES`
    /// overrides the subprocess concurrency bound; `GOPROXY_PATH_PREFIX`
    /// sets the stripped path prefix; `GOPROXY_CACHE_DIR` sets the base
    /// temp directory; `GOPROXY_PROXIED_SUMDBS` is a comma-separated
    /// list of additional sumdb names to proxy verbatim;
    /// `GOPROXY_DISABLE_FETCH` toggles whether `Disable-Module-Fetch` is
    /// honored.
    pub fn from_process_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("GOPROXY_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            }
        }
        if let Ok(go_bin) = std::env::var("GOPROXY_GOBIN") {
            config.go_bin = go_bin;
        }
        if let Ok(max) = std::env::var("GOPROXY_MAX_DIRECT_FETCHES") {
            if let Ok(parsed) = max.parse() {
                config.max_direct_fetches = parsed;
            }
        }
        if let Ok(prefix) = std::env::var("GOPROXY_PATH_PREFIX") {
            config.path_prefix = Some(prefix);
        }
        if let Ok(cache_dir) = std::env::var("GOPROXY_CACHE_DIR") {
            config.temp_dir = Some(PathBuf::from(cache_dir));
        }
        if let Ok(sumdbs) = std::env::var("GOPROXY_PROXIED_SUMDBS") {
            config.proxied_sumdbs = sumdbs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(disable_fetch) = std::env::var("GOPROXY_DISABLE_FETCH") {
            config.disable_fetch_header_enabled = disable_fetch.eq_ignore_ascii_case("true");
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_localhost() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
    }

    // `std::env::set_var` is process-global, so every case that reads
    // `GOPROXY_*` lives in one test to avoid racing other tests in this
    // file that run concurrently within the same binary.
    #[test]
    fn from_process_env_reads_cache_dir_sumdbs_and_disable_fetch() {
        unsafe {
            std::env::set_var("GOPROXY_CACHE_DIR", "/tmp/goproxy-cache");
            std::env::set_var("GOPROXY_PROXIED_SUMDBS", " sum.golang.org , sum.example.com ,");
            std::env::set_var("GOPROXY_DISABLE_FETCH", "FALSE");
        }

        let config = ServerConfig::from_process_env();

        unsafe {
            std::env::remove_var("GOPROXY_CACHE_DIR");
            std::env::remove_var("GOPROXY_PROXIED_SUMDBS");
            std::env::remove_var("GOPROXY_DISABLE_FETCH");
        }

        assert_eq!(config.temp_dir, Some(PathBuf::from("/tmp/goproxy-cache")));
        assert_eq!(
            config.proxied_sumdbs,
            vec!["sum.golang.org".to_string(), "sum.example.com".to_string()]
        );
        assert!(!config.disable_fetch_header_enabled);
    }
}
