use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Service, ShutdownPolicy};
use crate::sync::PassRunner;
use crate::sync::scheduler::Scheduler;

/// Runs sync passes on a fixed interval until shutdown.
pub struct SyncService {
    scheduler: Scheduler<dyn PassRunner>,
}

impl SyncService {
    pub fn new(runner: Arc<dyn PassRunner>, interval: Duration) -> Self {
        Self {
            scheduler: Scheduler::new(runner, interval),
        }
    }
}

#[async_trait]
impl Service for SyncService {
    fn name(&self) -> &'static str {
        "sync"
    }

    /// A pass in flight always finishes; the scheduler stops before the next.
    fn shutdown_policy(&self) -> ShutdownPolicy {
        ShutdownPolicy::RunToCompletion
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        self.scheduler.run(shutdown).await;
        Ok(())
    }
}
