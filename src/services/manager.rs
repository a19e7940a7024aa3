use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Service, ServiceResult, ShutdownPolicy};
use crate::utils::fmt_duration;

/// Owns registered services, spawns them and coordinates their shutdown.
pub struct ServiceManager {
    registered: HashMap<&'static str, Box<dyn Service>>,
    running: HashMap<&'static str, (JoinHandle<ServiceResult>, ShutdownPolicy)>,
    shutdown: CancellationToken,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
            running: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        self.registered.insert(service.name(), service);
    }

    pub fn has_services(&self) -> bool {
        !self.registered.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service on its own task.
    pub fn spawn_all(&mut self) {
        for (name, service) in self.registered.drain() {
            let policy = service.shutdown_policy();
            let shutdown = self.shutdown.child_token();
            let handle = tokio::spawn(run_service(service, shutdown));
            self.running.insert(name, (handle, policy));
            debug!(service = name, "Service spawned");
        }
        info!(services = self.running.len(), "All services spawned");
    }

    /// Wait until any service exits, returning its name and result.
    pub async fn run(&mut self) -> (&'static str, ServiceResult) {
        if self.running.is_empty() {
            return ("none", ServiceResult::NormalCompletion);
        }
        let (names, handles): (Vec<_>, Vec<_>) = self.running.iter_mut().map(|(n, (h, _))| (*n, h)).unzip();
        let (result, index, _) = futures::future::select_all(handles).await;
        let name = names[index];
        self.running.remove(name);
        let result = result.unwrap_or_else(|e| ServiceResult::Error(anyhow::anyhow!("service task panicked: {e}")));
        (name, result)
    }

    /// Cancel every service and wait up to `timeout` for them to stop.
    ///
    /// Services with [`ShutdownPolicy::RunToCompletion`] are waited for
    /// without a limit, after the abortable ones have been dealt with.
    /// Returns the elapsed time, or the names of services that were aborted.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Duration, Vec<&'static str>> {
        let start = std::time::Instant::now();
        self.shutdown.cancel();

        let (abortable, patient): (Vec<_>, Vec<_>) = self
            .running
            .drain()
            .partition(|(_, (_, policy))| *policy == ShutdownPolicy::Abortable);

        let mut pending = Vec::new();
        for (name, (mut handle, _)) in abortable {
            let remaining = timeout.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(result) => log_exit(name, result),
                Err(_) => {
                    warn!(service = name, "Service did not stop in time, aborting");
                    handle.abort();
                    pending.push(name);
                }
            }
        }

        for (name, (handle, _)) in patient {
            if !handle.is_finished() {
                info!(service = name, "Waiting for service to finish in-flight work");
            }
            log_exit(name, handle.await);
        }

        let elapsed = start.elapsed();
        if pending.is_empty() {
            info!(elapsed = fmt_duration(elapsed), "All services stopped");
            Ok(elapsed)
        } else {
            Err(pending)
        }
    }
}

fn log_exit(name: &'static str, result: Result<ServiceResult, tokio::task::JoinError>) {
    match result {
        Ok(ServiceResult::Error(e)) => warn!(service = name, error = ?e, "Service stopped with error"),
        Ok(_) => debug!(service = name, "Service stopped"),
        Err(e) => error!(service = name, error = %e, "Service task panicked"),
    }
}

async fn run_service(service: Box<dyn Service>, shutdown: CancellationToken) -> ServiceResult {
    let name = service.name();
    info!(service = name, "Service started");
    match service.run(shutdown.clone()).await {
        Ok(()) if shutdown.is_cancelled() => {
            info!(service = name, "Service shut down gracefully");
            ServiceResult::GracefulShutdown
        }
        Ok(()) => {
            warn!(service = name, "Service completed unexpectedly");
            ServiceResult::NormalCompletion
        }
        Err(e) => {
            error!(service = name, error = ?e, "Service failed");
            ServiceResult::Error(e)
        }
    }
}
