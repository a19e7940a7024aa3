//! Ordered steps with compensating actions, run without a transaction.

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

pub type StepFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;
type Action<'a> = Box<dyn Fn() -> StepFuture<'a> + Send + Sync + 'a>;

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("step '{step}' failed: {source}")]
    Aborted {
        step: &'static str,
        source: anyhow::Error,
    },
    #[error(
        "step '{step}' failed ({source}) and compensation '{rollback_step}' also failed: {rollback_source}"
    )]
    RollbackFailed {
        step: &'static str,
        source: anyhow::Error,
        rollback_step: &'static str,
        rollback_source: anyhow::Error,
    },
}

pub struct SagaStep<'a> {
    name: &'static str,
    forward: Action<'a>,
    compensate: Option<Action<'a>>,
    compensate_on_failure: bool,
}

impl<'a> SagaStep<'a> {
    pub fn new<F>(name: &'static str, forward: F) -> Self
    where
        F: Fn() -> StepFuture<'a> + Send + Sync + 'a,
    {
        Self {
            name,
            forward: Box::new(forward),
            compensate: None,
            compensate_on_failure: false,
        }
    }

    /// Reverse action run when a later step (or this one, see
    /// [`compensate_on_failure`](Self::compensate_on_failure)) fails.
    pub fn compensate_with<F>(mut self, compensate: F) -> Self
    where
        F: Fn() -> StepFuture<'a> + Send + Sync + 'a,
    {
        self.compensate = Some(Box::new(compensate));
        self
    }

    /// Also compensate this step when it fails itself, for steps that can
    /// leave partial effects behind.
    pub fn compensate_on_failure(mut self) -> Self {
        self.compensate_on_failure = true;
        self
    }
}

#[derive(Default)]
pub struct Saga<'a> {
    steps: Vec<SagaStep<'a>>,
}

impl<'a> Saga<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn step(mut self, step: SagaStep<'a>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order. On failure, compensate completed steps in
    /// reverse order and return the failure.
    pub async fn execute(self) -> Result<(), SagaError> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = step.name, "Running saga step");
            let Err(source) = (step.forward)().await else {
                continue;
            };

            warn!(step = step.name, error = %source, "Saga step failed, compensating");
            let undo_to = if step.compensate_on_failure { index + 1 } else { index };
            for done in self.steps[..undo_to].iter().rev() {
                let Some(compensate) = &done.compensate else {
                    continue;
                };
                debug!(step = done.name, "Compensating saga step");
                if let Err(rollback_source) = compensate().await {
                    return Err(SagaError::RollbackFailed {
                        step: step.name,
                        source,
                        rollback_step: done.name,
                        rollback_source,
                    });
                }
            }
            return Err(SagaError::Aborted {
                step: step.name,
                source,
            });
        }
        Ok(())
    }
}
