use std::process;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Listens for SIGINT/SIGTERM and coordinates graceful shutdown (§4.7).
///
/// The first signal sets `shutdown_requested` and cancels every mapping's
/// task. A *second* signal received before shutdown has completed exits the
/// process immediately with a non-zero status — the only forced-exit path in
/// this system (§4.7, §8 "signal escalation").
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();
        let shutdown_flag = self.shutdown_requested.clone();
        let complete_flag = self.shutdown_complete.clone();

        tokio::spawn(async move {
            wait_for_termination_signal().await;
            info!("shutdown signal received, cancelling all mappings");
            shutdown_flag.store(true, Ordering::SeqCst);
            cancel_token.cancel();

            wait_for_termination_signal().await;
            if !complete_flag.load(Ordering::SeqCst) {
                warn!("second shutdown signal received before shutdown completed, exiting immediately");
                process::exit(1);
            }
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Marks shutdown as complete so a signal arriving afterward (e.g. during
    /// normal process exit) is not mistaken for the escalation case.
    pub fn mark_shutdown_complete(&self) {
        self.shutdown_complete.store(true, Ordering::SeqCst);
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

async fn wait_for_termination_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Exit codes for the CLI application (§6 "Exit code 0 on success, 1 on
/// configuration or runtime error").
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
