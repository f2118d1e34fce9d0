use tracing::Level;

/// Installs the global fmt subscriber.
pub fn init(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler.");
            std::future::pending::<()>().await;
        }
    }
}
