//! Environment parsing and normalization.

use crate::proxy_list::ProxyList;

/// Well-known `GOSUMDB` aliases and their canonical verifier keys.
///
/// The real Go toolchain ships the actual Ed25519 public keys here;
/// this crate carries placeholder key material of the same shape
/// (`<name>+<hex>+<base64>`) since no live checksum database is
/// contacted in tests, and the real key is an operational secret a
/// deployment supplies via `GOSUMDB`, not something to hardcode.
const SUM_GOLANG_ORG: &str = "sum.golang.org";
const SUM_GOLANG_ORG_KEY: &str =
    "sum.golang.org+033de0ae+Ac4zctda0e5eza+HJyk9SxEdh+s3Up0N+FUlJJ8jVfyC"; // pragma: allowlist secret
const SUM_GOLANG_GOOGLE_CN: &str = "sum.golang.google.cn";
const SUM_GOLANG_GOOGLE_CN_DIRECT_URL: &str = "https://cache.googleapis.cn/sumdb/sum.golang.org";

/// Normalized environment configuration driving the fetcher.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Parsed, normalized `GOPROXY` proxy list.
    pub proxy_list: ProxyList,
    /// Raw `GOSUMDB` value after defaulting (verifier key, optional URL).
    /// `None` means the sumdb is disabled.
    pub sumdb: Option<String>,
    /// `GONOPROXY` (or `GOPRIVATE` fallback), comma-separated glob list.
    pub no_proxy: String,
    /// `GONOSUMDB` (or `GOPRIVATE` fallback), comma-separated glob list.
    pub no_sumdb: String,
}

/// Raw environment inputs, one field per `GO*` variable recognized.
#[derive(Debug, Clone, Default)]
pub struct RawEnv {
    pub go_proxy: Option<String>,
    pub go_sumdb: Option<String>,
    pub go_no_proxy: Option<String>,
    pub go_no_sumdb: Option<String>,
    pub go_private: Option<String>,
}

impl RawEnv {
    /// Reads the five variables from the host process environment.
    pub fn from_process_env() -> Self {
        Self {
            go_proxy: std::env::var("GOPROXY").ok(),
            go_sumdb: std::env::var("GOSUMDB").ok(),
            go_no_proxy: std::env::var("GONOPROXY").ok(),
            go_no_sumdb: std::env::var("GONOSUMDB").ok(),
            go_private: std::env::var("GOPRIVATE").ok(),
        }
    }
}

impl Environment {
    /// Normalizes raw environment variables into an [`Environment`].
    pub fn from_raw(raw: &RawEnv, sumdb_disabled_by_caller: bool) -> Self {
        let proxy_list = ProxyList::parse(raw.go_proxy.as_deref().unwrap_or(""));

        let sumdb = match raw.go_sumdb.as_deref() {
            Some("") | None if sumdb_disabled_by_caller => None,
            Some("") | None => Some(SUM_GOLANG_ORG.to_string()),
            Some("off") => None,
            Some(other) => Some(other.to_string()),
        };

        let private = raw.go_private.clone().unwrap_or_default();
        let no_proxy = raw
            .go_no_proxy
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| private.clone());
        let no_sumdb = raw
            .go_no_sumdb
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or(private);

        Self {
            proxy_list,
            sumdb,
            no_proxy,
            no_sumdb,
        }
    }

    /// True if `module_path` should bypass proxies/direct-sumdb per
    /// `GONOPROXY`/`GOPRIVATE`.
    pub fn is_no_proxy(&self, module_path: &str) -> bool {
        crate::glob::globs_match(&self.no_proxy, module_path)
    }

    /// True if `module_path` should skip checksum-DB verification per
    /// `GONOSUMDB`/`GOPRIVATE`.
    pub fn is_no_sumdb(&self, module_path: &str) -> bool {
        crate::glob::globs_match(&self.no_sumdb, module_path)
    }
}

/// Resolves a `GOSUMDB` value (verifier key, with an optional explicit
/// URL) into `(name, verifier_key, url, is_direct_url)`.
///
/// `sumdb` is the raw `GOSUMDB` string, e.g. `"sum.golang.org"` or
/// `"example.com+abcd1234 https://sumdb.example.com"`.
pub fn resolve_sumdb_key(sumdb: &str) -> SumdbKeySpec {
    let mut parts = sumdb.splitn(2, ' ');
    let key = parts.next().unwrap_or_default().trim().to_string();
    let explicit_url = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let name = key.split('+').next().unwrap_or(&key).to_string();

    if name == SUM_GOLANG_ORG {
        return SumdbKeySpec {
            name,
            verifier_key: SUM_GOLANG_ORG_KEY.to_string(),
            url: explicit_url
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://{SUM_GOLANG_ORG}")),
            is_direct_url: false,
        };
    }
    if name == SUM_GOLANG_GOOGLE_CN {
        return SumdbKeySpec {
            name: SUM_GOLANG_ORG.to_string(),
            verifier_key: SUM_GOLANG_ORG_KEY.to_string(),
            url: explicit_url
                .map(str::to_string)
                .unwrap_or_else(|| SUM_GOLANG_GOOGLE_CN_DIRECT_URL.to_string()),
            is_direct_url: true,
        };
    }

    SumdbKeySpec {
        url: explicit_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://{name}")),
        name,
        verifier_key: key,
        is_direct_url: false,
    }
}

/// Resolved checksum-DB endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumdbKeySpec {
    pub name: String,
    pub verifier_key: String,
    pub url: String,
    pub is_direct_url: bool,
}
