//! Request router and HTTP transport for the Go module proxy.

pub mod config;
pub mod response;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use router::Router;
pub use server::HttpServer;
