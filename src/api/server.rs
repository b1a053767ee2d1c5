//! Docker plugin socket server.
//!
//! Serves the secret driver protocol over a host-provisioned Unix socket:
//! `POST /Plugin.Activate` for the plugin handshake and
//! `POST /SecretProvider.GetSecret` for secret requests. The daemon answers
//! 200 for every well-formed request; driver failures are reported in the
//! response `Err` field.

use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::api::types::{SecretRequest, SecretResponse};
use crate::driver::SecretsDriver;
use crate::errors::{Error, Result};

/// Build the plugin protocol router.
pub fn plugin_router(driver: Arc<SecretsDriver>) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/SecretProvider.GetSecret", post(get_secret))
        .with_state(driver)
}

async fn activate() -> Json<serde_json::Value> {
    Json(json!({ "Implements": ["secretprovider"] }))
}

async fn get_secret(
    State(driver): State<Arc<SecretsDriver>>,
    Json(request): Json<SecretRequest>,
) -> Json<SecretResponse> {
    Json(driver.get_secret(&request).await)
}

/// Serve the plugin protocol on `socket_path` until a shutdown signal
/// arrives.
pub async fn serve_plugin(socket_path: &Path, driver: Arc<SecretsDriver>) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // A stale socket from a previous run blocks the bind.
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path).map_err(|e| {
        Error::config(format!("Failed to bind plugin socket {}: {}", socket_path.display(), e))
    })?;

    info!(socket = %socket_path.display(), "Serving secrets plugin");
    axum::serve(listener, plugin_router(driver))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, cleaning up");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activate_reports_secretprovider() {
        let Json(body) = activate().await;
        assert_eq!(body["Implements"][0], "secretprovider");
    }
}
