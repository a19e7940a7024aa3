//! Long-running services and their lifecycle.

pub mod manager;
pub mod signals;
pub mod sync;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// How a service's `run` ended.
#[derive(Debug)]
pub enum ServiceResult {
    /// Stopped after shutdown was requested.
    GracefulShutdown,
    /// Returned on its own without being asked to stop.
    NormalCompletion,
    Error(anyhow::Error),
}

/// What the manager may do with a service still running when the shutdown
/// timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Abort the task.
    Abortable,
    /// Keep waiting; the service stops at its next safe point. Only a second
    /// signal ends the process earlier.
    RunToCompletion,
}

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    fn shutdown_policy(&self) -> ShutdownPolicy {
        ShutdownPolicy::Abortable
    }

    /// Run until finished or until `shutdown` is cancelled. Services stop
    /// cooperatively, so in-flight work may complete first.
    async fn run(&self, shutdown: CancellationToken) -> Result<(), anyhow::Error>;
}
