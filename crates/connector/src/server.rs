//! HTTP server that binds the connector router to a TCP socket.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::auth::CredentialGate;
use crate::config::Config;
use crate::files::{FileService, PathGuard};
use crate::router::{build_router, AppState, RouterSettings};

/// Errors that can occur while serving.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind to the TCP address.
    #[error("failed to bind on {addr}: {source}")]
    Bind {
        /// The address string.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server encountered an I/O error while serving.
    #[error("server error: {0}")]
    Serve(String),
}

/// Build the shared handler state from a validated configuration.
///
/// The configuration file at `config_path` and the running executable are
/// always added to the blacklist.
pub fn build_state(config: &Config, config_path: &Path) -> anyhow::Result<AppState> {
    let mut blacklist: Vec<PathBuf> = config.sandbox.blacklist.clone();
    blacklist.push(
        std::path::absolute(config_path)
            .with_context(|| format!("Failed to resolve {}", config_path.display()))?,
    );
    match std::env::current_exe() {
        Ok(exe) => blacklist.push(exe),
        Err(e) => tracing::warn!(error = %e, "Could not determine current executable"),
    }

    let guard = PathGuard::new(&config.sandbox.root, blacklist).with_context(|| {
        format!(
            "Invalid sandbox root: {}",
            config.sandbox.root.display()
        )
    })?;
    tracing::info!(
        root = %guard.root().display(),
        blacklisted = guard.blacklist().count(),
        "Sandbox ready"
    );

    let allowed_origin = HeaderValue::from_str(&config.server.allowed_origin)
        .with_context(|| format!("Invalid allowed_origin: {}", config.server.allowed_origin))?;

    Ok(AppState {
        service: Arc::new(FileService::new(Arc::new(guard))),
        gate: Arc::new(CredentialGate::new(&config.auth.credential())),
        settings: Arc::new(RouterSettings {
            public_url: config.server.public_url.clone(),
            allowed_origin,
            max_body_bytes: config.server.max_body_bytes,
        }),
    })
}

/// Axum-based HTTP server for the connector.
pub struct ConnectorServer {
    pub(crate) addr: SocketAddr,
    pub(crate) state: AppState,
}

impl ConnectorServer {
    /// Creates a new server for `addr`.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Creates a server from the configured bind address and port.
    pub fn from_config(config: &Config, state: AppState) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid bind address: {}:{}",
                    config.server.bind_address, config.server.port
                )
            })?;
        Ok(Self::new(addr, state))
    }

    /// The configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> Result<TcpListener, TransportError> {
        TcpListener::bind(self.addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: self.addr.to_string(),
                source: e,
            })
    }

    /// Serve requests on `listener` until `shutdown` completes.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.addr.to_string());
        tracing::info!(addr = %local, "fsconnector listening");

        let router = build_router(self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| TransportError::Serve(e.to_string()))?;

        tracing::info!("fsconnector stopped");
        Ok(())
    }

    /// Bind and serve until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.sandbox.root = root.to_path_buf();
        config.auth.username = "alice".to_string();
        config.auth.password = "s3cret".to_string();
        config
    }

    #[test]
    fn bind_error_displays_address() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:8080".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:8080"));
    }

    #[test]
    fn state_blacklists_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();

        let state = build_state(&test_config(temp_dir.path()), &config_path).unwrap();
        let canonical = fs::canonicalize(&config_path).unwrap();
        assert!(state.service.guard().is_blacklisted(&canonical));
    }

    #[test]
    fn state_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir.path().join("missing"));
        assert!(build_state(&config, &temp_dir.path().join("c.toml")).is_err());
    }

    #[test]
    fn from_config_uses_bind_address() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.server.port = 8088;
        let state = build_state(&config, &temp_dir.path().join("c.toml")).unwrap();

        let server = ConnectorServer::from_config(&config, state).unwrap();
        assert_eq!(server.addr().port(), 8088);
        assert!(server.addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn serves_over_tcp_until_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let state = build_state(&config, &temp_dir.path().join("c.toml")).unwrap();

        let server = ConnectorServer::new("127.0.0.1:0".parse().unwrap(), state);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET /connector/version HTTP/1.1\r\nHost: {}\r\nAuthorization: {}\r\nConnection: close\r\n\r\n",
            addr,
            config.auth.credential().header_value()
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""status":"success""#));
        assert!(response.contains("fsconnector/"));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
