//! The module fetcher: QUERY/LIST/DOWNLOAD dispatch across the proxy
//! walk and the direct toolchain path, plus post-download validation
//! and checksum-DB verification.

use crate::direct::{self, CommandOutput, ToolchainRunner};
use crate::http_getter::HttpGetter;
use crate::sumdb::SumdbClient;
use crate::tempdir::SharedTempDir;
use crate::verify;
use chrono::{DateTime, Utc};
use goproxy_core::config::Environment;
use goproxy_core::context::FetchContext;
use goproxy_core::error::{Error, Result};
use goproxy_core::model::{self, FetchResult};
use goproxy_core::path;
use goproxy_core::version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A completed DOWNLOAD: the validated result plus the temp-directory
/// guard keeping info/mod/zip alive until every reader has released
/// its clone.
pub struct DownloadOutcome {
    pub result: FetchResult,
    pub guard: SharedTempDir,
}

/// Everything the fetcher needs to serve one request.
pub struct Fetcher {
    environment: Environment,
    getter: HttpGetter,
    sumdb: Option<SumdbClient>,
    runner: Arc<dyn ToolchainRunner>,
    direct_semaphore: Option<Arc<Semaphore>>,
    temp_base: Option<PathBuf>,
}

impl Fetcher {
    pub fn new(
        environment: Environment,
        sumdb: Option<SumdbClient>,
        runner: Arc<dyn ToolchainRunner>,
        max_direct_fetches: usize,
        temp_base: Option<PathBuf>,
    ) -> Self {
        Self {
            environment,
            getter: HttpGetter::new(),
            sumdb,
            runner,
            direct_semaphore: (max_direct_fetches > 0)
                .then(|| Arc::new(Semaphore::new(max_direct_fetches))),
            temp_base,
        }
    }

    /// `Query(ctx, path, query) -> (version, time)`.
    pub async fn query(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        query: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        if self.environment.is_no_proxy(module_path) {
            return self.query_direct(ctx, module_path, query).await;
        }
        let environment = &self.environment;
        let getter = &self.getter;
        environment
            .proxy_list
            .walk(
                |proxy| {
                    let proxy = proxy.to_string();
                    async move { query_proxy(getter, ctx, &proxy, module_path, query).await }
                },
                || self.query_direct(ctx, module_path, query),
            )
            .await
    }

    /// `List(ctx, path) -> versions[]`.
    pub async fn list(&self, ctx: &FetchContext, module_path: &str) -> Result<Vec<String>> {
        if self.environment.is_no_proxy(module_path) {
            return self.list_direct(ctx, module_path).await;
        }
        let getter = &self.getter;
        self.environment
            .proxy_list
            .walk(
                |proxy| {
                    let proxy = proxy.to_string();
                    async move { list_proxy(getter, ctx, &proxy, module_path).await }
                },
                || self.list_direct(ctx, module_path),
            )
            .await
    }

    /// `Download(ctx, path, version) -> (info, mod, zip)`.
    pub async fn download(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        version: &str,
    ) -> Result<DownloadOutcome> {
        let outcome = if self.environment.is_no_proxy(module_path) {
            self.download_direct(ctx, module_path, version).await
        } else {
            let getter = &self.getter;
            let temp_base = self.temp_base.as_deref();
            self.environment
                .proxy_list
                .walk(
                    |proxy| {
                        let proxy = proxy.to_string();
                        async move {
                            download_proxy(getter, ctx, &proxy, module_path, version, temp_base).await
                        }
                    },
                    || self.download_direct(ctx, module_path, version),
                )
                .await
        }?;

        self.verify_download(ctx, module_path, version, &outcome).await?;
        Ok(outcome)
    }

    async fn verify_download(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        version: &str,
        outcome: &DownloadOutcome,
    ) -> Result<()> {
        let info_path = outcome.result.info_path.as_deref().expect("download sets info_path");
        let mod_path = outcome.result.mod_path.as_deref().expect("download sets mod_path");
        let zip_path = outcome.result.zip_path.as_deref().expect("download sets zip_path");

        let data = tokio::fs::read(info_path).await?;
        let (parsed_version, parsed_time) = model::unmarshal_info(&data)?;
        let normalized = model::marshal_info(&parsed_version, parsed_time)?;
        tokio::fs::write(info_path, normalized).await?;

        if !verify::mod_file_has_module_directive(mod_path)? {
            return Err(untrusted(module_path, version));
        }

        let prefix = format!("{module_path}@{version}/");
        if verify::zip_entries_have_prefix(zip_path, &prefix).is_err() {
            return Err(untrusted(module_path, version));
        }

        if let Some(sumdb) = &self.sumdb {
            if !self.environment.is_no_sumdb(module_path) {
                self.sumdb_verify(ctx, sumdb, module_path, version, zip_path, mod_path)
                    .await?;
            }
        }

        Ok(())
    }

    async fn sumdb_verify(
        &self,
        ctx: &FetchContext,
        sumdb: &SumdbClient,
        module_path: &str,
        version: &str,
        zip_path: &Path,
        mod_path: &Path,
    ) -> Result<()> {
        let escaped_path = path::escape(module_path);
        let escaped_version = path::escape(version);
        let raw = sumdb
            .read_remote(ctx, &format!("lookup/{escaped_path}@{escaped_version}"))
            .await?;
        let text = String::from_utf8_lossy(&raw);

        let mut zip_hash = None;
        let mut mod_hash = None;
        let mod_entry_suffix = format!("{version}/go.mod");
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(module), Some(ver_field), Some(hash)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if module != module_path {
                continue;
            }
            if ver_field == version {
                zip_hash = Some(hash.to_string());
            } else if ver_field == mod_entry_suffix {
                mod_hash = Some(hash.to_string());
            }
        }

        let computed_zip = verify::hash_zip(zip_path)?;
        let computed_mod = verify::hash_go_mod(mod_path, &format!("{module_path}@{version}/go.mod"))?;

        let zip_ok = zip_hash.as_deref() == Some(computed_zip.as_str());
        let mod_ok = mod_hash.as_deref() == Some(computed_mod.as_str());
        if !zip_ok || !mod_ok {
            return Err(untrusted(module_path, version));
        }
        Ok(())
    }

    async fn acquire_direct_permit(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match &self.direct_semaphore {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed"),
            ),
            None => None,
        }
    }

    async fn query_direct(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        query: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        let _permit = self.acquire_direct_permit().await;
        let temp_dir = SharedTempDir::new(self.temp_base.as_deref())?;
        let env = direct::derived_env(temp_dir.path(), &Default::default());
        let args = vec![
            "list".to_string(),
            "-json".to_string(),
            "-m".to_string(),
            format!("{module_path}@{query}"),
        ];
        let output = self
            .runner
            .run(ctx, &args, &env, temp_dir.path())
            .await?;
        let info: GoModuleInfo = parse_go_output(&output)?;
        let time = info
            .time
            .ok_or_else(|| Error::internal("go list did not report Time"))?;
        Ok((info.version, time))
    }

    async fn list_direct(&self, ctx: &FetchContext, module_path: &str) -> Result<Vec<String>> {
        let _permit = self.acquire_direct_permit().await;
        let temp_dir = SharedTempDir::new(self.temp_base.as_deref())?;
        let env = direct::derived_env(temp_dir.path(), &Default::default());
        let args = vec![
            "list".to_string(),
            "-json".to_string(),
            "-m".to_string(),
            "-versions".to_string(),
            format!("{module_path}@latest"),
        ];
        let output = self
            .runner
            .run(ctx, &args, &env, temp_dir.path())
            .await?;
        let info: GoModuleVersions = parse_go_output(&output)?;
        Ok(sorted_valid_versions(info.versions))
    }

    async fn download_direct(
        &self,
        ctx: &FetchContext,
        module_path: &str,
        version: &str,
    ) -> Result<DownloadOutcome> {
        let _permit = self.acquire_direct_permit().await;
        let temp_dir = SharedTempDir::new(self.temp_base.as_deref())?;
        let env = direct::derived_env(temp_dir.path(), &Default::default());
        let args = vec![
            "mod".to_string(),
            "download".to_string(),
            "-json".to_string(),
            format!("{module_path}@{version}"),
        ];
        let output = self
            .runner
            .run(ctx, &args, &env, temp_dir.path())
            .await?;
        let download: GoModDownload = parse_go_output(&output)?;

        let data = tokio::fs::read(&download.info_path).await?;
        let (parsed_version, parsed_time) = model::unmarshal_info(&data)?;

        let result = FetchResult::download(
            parsed_version,
            parsed_time,
            PathBuf::from(&download.info_path),
            PathBuf::from(&download.go_mod),
            PathBuf::from(&download.zip),
        );
        Ok(DownloadOutcome {
            result,
            guard: temp_dir,
        })
    }
}

fn parse_go_output<T: for<'de> Deserialize<'de>>(output: &CommandOutput) -> Result<T> {
    if output.exit_code != 0 {
        return Err(direct::classify_failure(output));
    }
    serde_json::from_str(&output.stdout).map_err(|e| Error::internal(e.to_string()))
}

fn untrusted(module_path: &str, version: &str) -> Error {
    Error::not_found(format!(
        "{module_path}@{version}: invalid version: untrusted revision {version}"
    ))
}

fn sorted_valid_versions(raw: Vec<String>) -> Vec<String> {
    let mut parsed: Vec<(semver::Version, String)> = raw
        .into_iter()
        .filter(|v| version::is_valid_semver(v) && !version::is_pseudo_version(v))
        .filter_map(|v| {
            let stripped = v.strip_prefix('v')?;
            let stripped = stripped.strip_suffix("+incompatible").unwrap_or(stripped);
            semver::Version::parse(stripped).ok().map(|sv| (sv, v))
        })
        .collect();
    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    parsed.into_iter().map(|(_, v)| v).collect()
}

async fn query_proxy(
    getter: &HttpGetter,
    ctx: &FetchContext,
    proxy: &str,
    module_path: &str,
    query: &str,
) -> Result<(String, DateTime<Utc>)> {
    let escaped_path = path::escape(module_path);
    let url = if query == "latest" {
        path::join(proxy, &format!("{escaped_path}/@latest"))
    } else {
        let escaped_query = path::escape(query);
        path::join(proxy, &format!("{escaped_path}/@v/{escaped_query}.info"))
    };
    let bytes = getter.get_bytes(ctx, &url).await?;
    model::unmarshal_info(&bytes)
}

async fn list_proxy(
    getter: &HttpGetter,
    ctx: &FetchContext,
    proxy: &str,
    module_path: &str,
) -> Result<Vec<String>> {
    let escaped_path = path::escape(module_path);
    let url = path::join(proxy, &format!("{escaped_path}/@v/list"));
    let bytes = getter.get_bytes(ctx, &url).await?;
    let text = String::from_utf8_lossy(&bytes);
    let raw: Vec<String> = text.lines().map(|l| l.split_whitespace().next().unwrap_or("").to_string()).collect();
    Ok(sorted_valid_versions(raw))
}

async fn download_proxy(
    getter: &HttpGetter,
    ctx: &FetchContext,
    proxy: &str,
    module_path: &str,
    version: &str,
    temp_base: Option<&Path>,
) -> Result<DownloadOutcome> {
    let escaped_path = path::escape(module_path);
    let escaped_version = path::escape(version);
    let temp_dir = SharedTempDir::new(temp_base)?;

    let info_url = path::join(proxy, &format!("{escaped_path}/@v/{escaped_version}.info"));
    let mod_url = path::join(proxy, &format!("{escaped_path}/@v/{escaped_version}.mod"));
    let zip_url = path::join(proxy, &format!("{escaped_path}/@v/{escaped_version}.zip"));

    let info_path = getter
        .get_to_temp_file(ctx, &info_url, temp_dir.path(), "download.info")
        .await?;
    let mod_path = getter
        .get_to_temp_file(ctx, &mod_url, temp_dir.path(), "download.mod")
        .await?;
    let zip_path = getter
        .get_to_temp_file(ctx, &zip_url, temp_dir.path(), "download.zip")
        .await?;

    let data = tokio::fs::read(&info_path).await?;
    let (parsed_version, parsed_time) = model::unmarshal_info(&data)?;

    let result = FetchResult::download(parsed_version, parsed_time, info_path, mod_path, zip_path);
    Ok(DownloadOutcome {
        result,
        guard: temp_dir,
    })
}

#[derive(Debug, Deserialize)]
struct GoModuleInfo {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Time")]
    time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GoModuleVersions {
    #[serde(rename = "Versions", default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoModDownload {
    #[serde(rename = "Info")]
    info_path: String,
    #[serde(rename = "GoMod")]
    go_mod: String,
    #[serde(rename = "Zip")]
    zip: String,
}
