//! HTTP server for the pull exposition endpoint.

use crate::config::PrometheusExporterConfig;
use crate::export::PullRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while serving the exposition endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the exposition server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl MetricsServerConfig {
    /// Creates a config with a custom port on all interfaces.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }

    /// Resolves the configured bind address and port.
    pub fn from_exporter(config: &PrometheusExporterConfig) -> Result<Self, ServerError> {
        let ip: IpAddr = config
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(config.bind_address.clone()))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, config.port),
        })
    }
}

/// Serves /metrics and /health until shut down.
pub async fn serve_metrics(
    config: MetricsServerConfig,
    registry: Arc<PullRegistry>,
) -> Result<(), ServerError> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!(addr = %config.bind_addr, "exposition server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    Ok(())
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(registry): State<Arc<PullRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_port() {
        let config = MetricsServerConfig::with_port(8000);
        assert_eq!(config.bind_addr.port(), 8000);
    }

    #[test]
    fn test_config_from_exporter() {
        let config = MetricsServerConfig::from_exporter(&PrometheusExporterConfig {
            enabled: true,
            port: 9100,
            prefix: "prom_".to_string(),
            bind_address: "127.0.0.1".to_string(),
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9100);
        assert!(config.bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_bad_bind_address_rejected() {
        let result = MetricsServerConfig::from_exporter(&PrometheusExporterConfig {
            enabled: true,
            port: 9100,
            prefix: String::new(),
            bind_address: "not-an-ip".to_string(),
        });
        assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    }
}
