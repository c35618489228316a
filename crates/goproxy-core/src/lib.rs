//! Core data model, environment parsing, and proxy-list walking shared
//! by the Go module proxy fetch-orchestration crates.
//!
//! This crate has no I/O of its own: HTTP, subprocess, and filesystem
//! concerns live in `goproxy-fetch`, `goproxy-cache`, and
//! `goproxy-server`. Everything here is pure parsing/data model so it
//! can be exhaustively unit tested without a network or a `go` binary.

pub mod config;
pub mod context;
pub mod error;
pub mod glob;
pub mod model;
pub mod path;
pub mod proxy_list;
pub mod version;

pub use context::FetchContext;
pub use error::{Error, NotFoundKind, Result};
pub use model::{FetchResult, ModuleCoordinate, Operation, VersionInfo};
pub use proxy_list::ProxyList;
