//! The fetch request/result data model.

use std::path::PathBuf;

/// A module coordinate: an unescaped module path paired with an
/// unescaped version (or the literal `latest`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCoordinate {
    pub path: String,
    pub version: String,
}

impl ModuleCoordinate {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// The `path@version` form used in error messages.
    pub fn display(&self) -> String {
        format!("{}@{}", self.path, self.version)
    }
}

/// The three fetch operations a request can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Resolve a query version specifier (`@latest`, or a non-semver `.info`).
    Query,
    /// List all known versions (`@v/list`).
    List,
    /// Download `.info`/`.mod`/`.zip` together for a pinned semver.
    Download,
}

impl Operation {
    /// The MIME type of a successful response for this operation, when
    /// it is not a DOWNLOAD `.mod`/`.zip` (those are decided by the
    /// router's suffix match, not the operation alone).
    pub const fn query_list_mime(self) -> &'static str {
        match self {
            Self::Query => "application/json; charset=utf-8",
            Self::List => "text/plain; charset=utf-8",
            Self::Download => "application/json; charset=utf-8",
        }
    }
}

/// `{Version, Time}` as marshaled on the wire.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time")]
    pub time: chrono::DateTime<chrono::Utc>,
}

/// Result of a fetch operation; only the fields relevant to the
/// requested op are populated.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub version: Option<String>,
    pub time: Option<chrono::DateTime<chrono::Utc>>,
    pub versions: Vec<String>,
    pub info_path: Option<PathBuf>,
    pub mod_path: Option<PathBuf>,
    pub zip_path: Option<PathBuf>,
}

impl FetchResult {
    pub fn query(version: impl Into<String>, time: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            version: Some(version.into()),
            time: Some(time),
            ..Self::default()
        }
    }

    pub fn list(versions: Vec<String>) -> Self {
        Self {
            versions,
            ..Self::default()
        }
    }

    pub fn download(
        version: impl Into<String>,
        time: chrono::DateTime<chrono::Utc>,
        info_path: PathBuf,
        mod_path: PathBuf,
        zip_path: PathBuf,
    ) -> Self {
        Self {
            version: Some(version.into()),
            time: Some(time),
            info_path: Some(info_path),
            mod_path: Some(mod_path),
            zip_path: Some(zip_path),
            ..Self::default()
        }
    }
}

/// Marshals a `{Version, Time}` pair the way the proxy's own JSON
/// responses do: stable field order, UTC, RFC3339 with nanosecond
/// precision.
///
/// # Errors
///
/// Returns an error if `version` is not valid semver/pseudo-version or
/// `time` is the Unix epoch zero value (treated as "unset").
pub fn marshal_info(
    version: &str,
    time: chrono::DateTime<chrono::Utc>,
) -> crate::error::Result<String> {
    if !crate::version::is_valid_semver(version) && !crate::version::is_pseudo_version(version) {
        return Err(crate::error::Error::internal(format!(
            "invalid version: {version}"
        )));
    }
    if time.timestamp() == 0 && time.timestamp_subsec_nanos() == 0 {
        return Err(crate::error::Error::internal("zero time"));
    }
    let info = VersionInfo {
        version: version.to_string(),
        time,
    };
    serde_json::to_string(&info).map_err(|e| crate::error::Error::internal(e.to_string()))
}

/// Reverses [`marshal_info`].
pub fn unmarshal_info(data: &[u8]) -> crate::error::Result<(String, chrono::DateTime<chrono::Utc>)> {
    let info: VersionInfo =
        serde_json::from_slice(data).map_err(|e| crate::error::Error::internal(e.to_string()))?;
    if !crate::version::is_valid_semver(&info.version) && !crate::version::is_pseudo_version(&info.version) {
        return Err(crate::error::Error::internal(format!(
            "invalid version: {}",
            info.version
        )));
    }
    Ok((info.version, info.time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn marshal_info_roundtrips() {
        let t = chrono::Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let marshaled = marshal_info("v1.0.0", t).unwrap();
        let (version, time) = unmarshal_info(marshaled.as_bytes()).unwrap();
        assert_eq!(version, "v1.0.0");
        assert_eq!(time, t);
    }

    #[test]
    fn marshal_info_rejects_invalid_version() {
        let t = chrono::Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(marshal_info("not-a-version", t).is_err());
    }

    #[test]
    fn marshal_info_rejects_zero_time() {
        let zero = chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap();
        assert!(marshal_info("v1.0.0", zero).is_err());
    }

    #[test]
    fn coordinate_display() {
        let coord = ModuleCoordinate::new("example.com/foo", "v1.0.0");
        assert_eq!(coord.display(), "example.com/foo@v1.0.0");
    }
}
