use std::future::pending;

/// Resolves once the process is asked to stop, with the name of the signal that arrived.
///
/// A signal that cannot be listened for is never reported.
pub async fn shutdown_signal() -> &'static str {
    tokio::select! {
        name = interrupt() => name,
        name = terminate() => name,
    }
}

async fn interrupt() -> &'static str {
    if tokio::signal::ctrl_c().await.is_err() {
        pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => pending::<()>().await,
    }
    "SIGTERM"
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    pending().await
}
