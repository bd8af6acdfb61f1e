//! Compensating multi-step transactions.
//!
//! # Responsibilities
//! - Run named steps in order, collecting their results
//! - On the first failure, compensate completed steps in reverse order
//! - Surface the error of the failing step, not compensation errors
//!
//! # Design Decisions
//! - The failing step is never compensated; only steps that completed are
//! - Compensation failures are logged and counted, and the unwind continues
//! - A saga runs at most once; its steps are consumed by `run`

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::observability::metrics;

type StepAction<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;
type CompensateAction<E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), E>> + Send>;

struct SagaStep<T, E> {
    name: String,
    execute: StepAction<T, E>,
    compensate: CompensateAction<E>,
}

/// Lifecycle of a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    NotStarted,
    Running,
    Completed,
    Compensating,
    Compensated,
}

/// Why a saga did not complete.
#[derive(Debug, Error)]
pub enum SagaError<E: std::error::Error + 'static> {
    /// A step failed; completed steps were compensated.
    #[error("saga step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: E,
    },

    #[error("saga has already been run")]
    AlreadyRun,
}

impl<E: std::error::Error + 'static> SagaError<E> {
    /// The failing step's error, if a step failed.
    pub fn into_source(self) -> Option<E> {
        match self {
            SagaError::StepFailed { source, .. } => Some(source),
            SagaError::AlreadyRun => None,
        }
    }
}

/// Ordered (execute, compensate) step pairs.
pub struct Saga<T, E> {
    id: Uuid,
    name: String,
    steps: Vec<SagaStep<T, E>>,
    state: SagaState,
    executed_count: usize,
}

impl<T, E> Saga<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps: Vec::new(),
            state: SagaState::NotStarted,
            executed_count: 0,
        }
    }

    /// Append a step.
    pub fn add_step<X, XFut, C, CFut>(mut self, name: impl Into<String>, execute: X, compensate: C) -> Self
    where
        X: FnOnce() -> XFut + Send + 'static,
        XFut: Future<Output = Result<T, E>> + Send + 'static,
        C: FnOnce() -> CFut + Send + 'static,
        CFut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.steps.push(SagaStep {
            name: name.into(),
            execute: Box::new(move || execute().boxed()),
            compensate: Box::new(move || compensate().boxed()),
        });
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Steps that completed successfully in the last run.
    pub fn executed_count(&self) -> usize {
        self.executed_count
    }

    /// Run every step; compensate on failure.
    pub async fn run(&mut self) -> Result<Vec<T>, SagaError<E>> {
        if self.state != SagaState::NotStarted {
            return Err(SagaError::AlreadyRun);
        }

        let span = tracing::info_span!("saga", saga = %self.name, id = %self.id);
        self.run_steps().instrument(span).await
    }

    async fn run_steps(&mut self) -> Result<Vec<T>, SagaError<E>> {
        self.state = SagaState::Running;
        let steps = std::mem::take(&mut self.steps);
        tracing::info!(steps = steps.len(), "Saga started");

        let mut results = Vec::with_capacity(steps.len());
        let mut completed: Vec<(String, CompensateAction<E>)> = Vec::with_capacity(steps.len());

        for step in steps {
            tracing::debug!(step = %step.name, "Saga step started");
            match (step.execute)().await {
                Ok(result) => {
                    tracing::debug!(step = %step.name, "Saga step completed");
                    results.push(result);
                    completed.push((step.name, step.compensate));
                    self.executed_count += 1;
                }
                Err(error) => {
                    tracing::warn!(step = %step.name, error = %error, "Saga step failed, compensating");
                    self.compensate(completed).await;
                    return Err(SagaError::StepFailed {
                        step: step.name,
                        source: error,
                    });
                }
            }
        }

        self.state = SagaState::Completed;
        tracing::info!("Saga completed");
        Ok(results)
    }

    async fn compensate(&mut self, completed: Vec<(String, CompensateAction<E>)>) {
        self.state = SagaState::Compensating;

        for (step, compensate) in completed.into_iter().rev() {
            match compensate().await {
                Ok(()) => {
                    tracing::info!(step = %step, "Saga step compensated");
                    metrics::record_saga_compensation(&self.name, true);
                }
                Err(e) => {
                    tracing::error!(step = %step, error = %e, "Saga compensation failed");
                    metrics::record_saga_compensation(&self.name, false);
                }
            }
        }

        self.state = SagaState::Compensated;
    }
}

impl<T, E> fmt::Debug for Saga<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .field("state", &self.state)
            .field("executed_count", &self.executed_count)
            .finish()
    }
}
