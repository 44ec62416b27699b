//! Shutdown coordination
//!
//! One `CancellationToken` is shared by the HTTP server and every request.
//! Cancelling it stops accepting connections and aborts the cluster calls
//! still in flight, which then answer 503.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Receiving side of the shutdown signal
///
/// Cloned into every component that must stop on shutdown. Request handlers
/// derive a child token so a shutdown aborts their gateway calls.
#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for one request, cancelled on shutdown
    pub fn request_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Owned by `main`; the only handle able to start shutdown
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Cancelling server and in-flight requests");
        }
        self.token.cancel();
    }
}

pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let token = CancellationToken::new();
    (
        ShutdownController {
            token: token.clone(),
        },
        ShutdownSignal { token },
    )
}

/// Block until the process is asked to terminate
///
/// Resolves to the name of the signal received (SIGTERM or SIGINT on unix,
/// Ctrl+C elsewhere). Fails only if the handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };
    info!(signal = name, "Termination signal received");
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "CTRL_C", "Termination signal received");
    Ok("CTRL_C")
}
