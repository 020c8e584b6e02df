use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;

use crate::config::ServerConfig;

/// Grace period for in-flight requests after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

async fn resolve_bind_addr(config: &ServerConfig) -> Result<SocketAddr> {
    tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to resolve bind address {}:{}", config.host, config.port))?
        .next()
        .with_context(|| format!("No address found for {}:{}", config.host, config.port))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Serve `app` until Ctrl-C or SIGTERM.
///
/// TLS is used when both a certificate and a key path are configured.
pub async fn run(config: &ServerConfig, app: Router) -> Result<()> {
    let addr = resolve_bind_addr(config).await?;

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, draining connections");
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    match (&config.tls_cert_path, &config.tls_key_path) {
        #[cfg(feature = "tls")]
        (Some(cert), Some(key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                .await
                .context("Failed to load TLS certificate or key")?;
            tracing::info!("Web server running at https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(service)
                .await
                .context("Server error")?;
        }
        _ => {
            tracing::info!("Web server running at http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(service)
                .await
                .context("Server error")?;
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
