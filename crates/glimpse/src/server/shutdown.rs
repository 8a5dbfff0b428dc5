//! OS signal handling for graceful shutdown.

/// Resolves on SIGINT, or on SIGTERM where that exists.
///
/// Passed to `axum::serve(..).with_graceful_shutdown()`, so in-flight
/// captions finish before the process exits.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_is_send() {
        fn assert_send<T: std::future::Future<Output = ()> + Send>(_f: T) {}
        assert_send(shutdown_signal());
    }

    #[tokio::test]
    async fn test_shutdown_signal_pending_without_signal() {
        let fired = tokio::select! {
            () = shutdown_signal() => true,
            () = tokio::time::sleep(std::time::Duration::from_millis(10)) => false,
        };
        assert!(!fired);
    }
}
