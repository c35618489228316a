//! HTTP getter, checksum-DB client, direct-toolchain invocation, and
//! the module fetcher that ties them together.

pub mod direct;
pub mod fetcher;
pub mod http_getter;
pub mod sumdb;
pub mod tempdir;
pub mod verify;

pub use direct::{CommandOutput, SubprocessRunner, ToolchainRunner};
pub use fetcher::{DownloadOutcome, Fetcher};
pub use http_getter::HttpGetter;
pub use sumdb::SumdbClient;
pub use tempdir::SharedTempDir;
