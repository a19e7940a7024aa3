use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, warn};

use super::ServiceResult;
use super::manager::ServiceManager;
use crate::utils::fmt_duration;

/// Run services until one exits or a shutdown signal arrives, then stop them.
///
/// Exit code is 0 for a clean shutdown, 1 when a service failed or had to be
/// aborted, and 2 for a forced shutdown on a second signal.
pub async fn handle_shutdown_signals(mut manager: ServiceManager, timeout: Duration) -> ExitCode {
    let mut exit_code = ExitCode::SUCCESS;

    tokio::select! {
        (name, result) = manager.run() => {
            match result {
                ServiceResult::GracefulShutdown | ServiceResult::NormalCompletion => {
                    warn!(service = name, "Service exited, shutting down");
                }
                ServiceResult::Error(e) => {
                    error!(service = name, error = ?e, "Service failed, shutting down");
                    exit_code = ExitCode::FAILURE;
                }
            }
        }
        signal = shutdown_signal() => {
            info!(signal, "Shutdown signal received");
        }
    }

    info!(timeout = fmt_duration(timeout), "Stopping services");
    tokio::select! {
        result = manager.shutdown(timeout) => match result {
            Ok(elapsed) => {
                info!(elapsed = fmt_duration(elapsed), "Graceful shutdown complete");
                exit_code
            }
            Err(pending) => {
                warn!(?pending, "Shutdown timed out");
                ExitCode::FAILURE
            }
        },
        signal = shutdown_signal() => {
            warn!(signal, "Second signal received, forcing exit");
            ExitCode::from(2)
        }
    }
}

/// Resolves with the name of the first SIGINT/SIGTERM received.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
