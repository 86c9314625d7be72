//! # fsconnector Server Library
//!
//! This crate exposes one directory tree of the local filesystem over
//! authenticated HTTP. Clients list directories, read files, overwrite
//! existing files and create new ones; nothing outside the sandbox root is
//! ever reachable.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        axum Router                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CORS  ─▶  Credential Gate  ─▶  Route table  ─▶  Handlers   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐        ┌──────────────────────────┐   │
//! │  │    PathGuard     │ ─────▶ │       FileService        │   │
//! │  │ (sandbox checks) │        │ (list/read/write/create) │   │
//! │  └──────────────────┘        └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use connector::{build_state, Config, ConnectorServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let path = connector::config::default_config_path();
//!     let config = Config::load(&path)?;
//!     config.validate()?;
//!
//!     let state = build_state(&config, &path)?;
//!     let server = ConnectorServer::from_config(&config, state)?;
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: Shared-secret credential check
//! - [`config`]: TOML configuration
//! - [`error`]: Request-level error type
//! - [`files`]: Sandboxed path resolution and file operations
//! - [`logging`]: Tracing subscriber setup
//! - [`router`]: Route table and HTTP handlers
//! - [`server`]: TCP listener and graceful shutdown

pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod router;
pub mod server;

pub use auth::{AuthError, Credential, CredentialGate};
pub use config::{Config, ConfigError};
pub use error::{ConnectorError, ConnectorResult};
pub use files::{AuthorizedPath, FileService, GuardError, NewPath, PathGuard, Resource};
pub use router::{build_router, AppState, RouteKind, RouterSettings};
pub use server::{build_state, ConnectorServer, TransportError};

/// Server name and version reported by `GET /connector/version`.
pub fn version_string() -> String {
    format!("fsconnector/{}", env!("CARGO_PKG_VERSION"))
}
