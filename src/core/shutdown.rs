use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM. The API stops accepting requests and the
/// worker stops claiming jobs; whatever is in flight finishes.
pub(crate) async fn shutdown_signal() {
    let received = tokio::select! {
        name = ctrl_c() => name,
        name = terminate() => name,
    };

    tracing::info!(signal = received, "Shutdown signal received, draining in-flight work");
}

async fn ctrl_c() -> &'static str {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
    "SIGTERM"
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending::<&'static str>().await
}
