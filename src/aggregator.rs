//! Multi-source aggregation
//!
//! Runs a batch of independent, named fetch operations with a bounded number
//! of workers and records exactly one outcome per task. A failing, panicking
//! or slow task becomes a [`TaskFailure`] in the result; it never stops its
//! siblings and never turns into an error for the whole batch.
//!
//! Timeouts stop the aggregator from waiting. Async operations are dropped at
//! that point, but blocking operations already running on the blocking pool
//! cannot be interrupted and finish in the background after giving up their
//! worker slot.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Errors that reject a batch before any task is dispatched
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    /// No tasks were submitted
    #[error("at least one task is required")]
    EmptyTaskSet,

    /// The worker limit must be at least one
    #[error("max_workers must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// Two tasks share a name, so their outcomes could not be told apart
    #[error("duplicate task name: '{0}'")]
    DuplicateTaskName(String),
}

enum Operation {
    Async(BoxFuture<'static, Result<Value, String>>),
    Blocking(Box<dyn FnOnce() -> Result<Value, String> + Send + 'static>),
}

/// One named unit of work submitted to the aggregator
pub struct AggregationTask {
    name: String,
    operation: Operation,
}

impl AggregationTask {
    /// Wraps an async operation. It does not start until a worker picks it up.
    pub fn new<F, E>(name: impl Into<String>, operation: F) -> Self
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            name: name.into(),
            operation: Operation::Async(
                operation.map(|r| r.map_err(|e| e.to_string())).boxed(),
            ),
        }
    }

    /// Wraps a blocking operation, run on tokio's blocking thread pool
    pub fn blocking<F, E>(name: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce() -> Result<Value, E> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            name: name.into(),
            operation: Operation::Blocking(Box::new(move || {
                operation().map_err(|e| e.to_string())
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for AggregationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.operation {
            Operation::Async(_) => "async",
            Operation::Blocking(_) => "blocking",
        };
        f.debug_struct("AggregationTask")
            .field("name", &self.name)
            .field("operation", &kind)
            .finish()
    }
}

/// Why a task did not produce a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The operation returned an error
    Error,
    /// The operation did not finish in time
    Timeout,
    /// The operation panicked
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Error => "error",
            FailureKind::Timeout => "timeout",
            FailureKind::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

/// A failed task's kind and human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// Terminal state of a single task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Value),
    Failure(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            TaskOutcome::Success(value) => Some(value),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(failure) => Some(failure),
        }
    }
}

/// Outcome of every task in a batch, keyed by task name
///
/// Always holds one entry per submitted task. Iteration order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregationResult {
    outcomes: HashMap<String, TaskOutcome>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Successful tasks and their payloads
    pub fn successes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outcomes
            .iter()
            .filter_map(|(k, v)| v.payload().map(|p| (k.as_str(), p)))
    }

    /// Failed tasks and why they failed
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TaskFailure)> {
        self.outcomes
            .iter()
            .filter_map(|(k, v)| v.failure().map(|f| (k.as_str(), f)))
    }

    /// Names of the failed tasks, sorted for display
    pub fn failed_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.failures().map(|(name, _)| name).collect();
        names.sort_unstable();
        names
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }

    /// Flattens the result into `name -> payload` for successes and
    /// `name -> "kind: reason"` for failures.
    pub fn to_report_map(&self) -> Map<String, Value> {
        self.outcomes
            .iter()
            .map(|(name, outcome)| {
                let value = match outcome {
                    TaskOutcome::Success(payload) => payload.clone(),
                    TaskOutcome::Failure(failure) => Value::String(failure.to_string()),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Runs batches of [`AggregationTask`]s on a bounded worker pool
#[derive(Debug, Clone)]
pub struct MultiSourceAggregator {
    max_workers: usize,
    per_task_timeout: Duration,
    batch_deadline: Option<Duration>,
}

impl MultiSourceAggregator {
    pub fn new(max_workers: usize, per_task_timeout: Duration) -> Self {
        Self {
            max_workers,
            per_task_timeout,
            batch_deadline: None,
        }
    }

    /// Caps the whole batch at `deadline`.
    ///
    /// Without it the batch may take up to `per_task_timeout` times the
    /// number of tasks.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn per_task_timeout(&self) -> Duration {
        self.per_task_timeout
    }

    /// Runs every task and returns one outcome per task name.
    ///
    /// Fails only when the batch itself is invalid: no tasks, a zero worker
    /// limit, or duplicate task names.
    pub async fn run(
        &self,
        tasks: Vec<AggregationTask>,
    ) -> Result<AggregationResult, AggregatorError> {
        self.validate(&tasks)?;

        let task_count = tasks.len();
        let deadline = self.batch_deadline.unwrap_or_else(|| {
            self.per_task_timeout
                .saturating_mul(u32::try_from(task_count).unwrap_or(u32::MAX))
        });
        info!(
            tasks = task_count,
            max_workers = self.max_workers,
            "running aggregation batch"
        );

        let permits = self.max_workers.min(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
        let mut join_set = JoinSet::new();

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.per_task_timeout;
            join_set.spawn(async move {
                let outcome = execute(task.operation, semaphore, timeout).await;
                (task.name, outcome)
            });
        }

        let started = Instant::now();
        let mut outcomes: HashMap<String, TaskOutcome> = HashMap::with_capacity(task_count);
        let mut deadline_hit = false;
        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((name, outcome))) => {
                        match &outcome {
                            TaskOutcome::Success(_) => debug!(task = %name, "task succeeded"),
                            TaskOutcome::Failure(failure) => {
                                warn!(task = %name, %failure, "task failed")
                            }
                        }
                        outcomes.insert(name, outcome);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "aggregation worker ended abnormally");
                    }
                },
                _ = &mut sleep => {
                    warn!(
                        elapsed = ?started.elapsed(),
                        "batch deadline elapsed, abandoning remaining tasks"
                    );
                    deadline_hit = true;
                    join_set.abort_all();
                    break;
                }
            }
        }

        for name in names {
            outcomes.entry(name).or_insert_with(|| {
                if deadline_hit {
                    TaskOutcome::Failure(TaskFailure::new(
                        FailureKind::Timeout,
                        format!("batch deadline of {:?} elapsed", deadline),
                    ))
                } else {
                    TaskOutcome::Failure(TaskFailure::new(
                        FailureKind::Panicked,
                        "worker ended without reporting",
                    ))
                }
            });
        }

        let result = AggregationResult { outcomes };
        info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            elapsed = ?started.elapsed(),
            "aggregation batch finished"
        );
        Ok(result)
    }

    fn validate(&self, tasks: &[AggregationTask]) -> Result<(), AggregatorError> {
        if tasks.is_empty() {
            return Err(AggregatorError::EmptyTaskSet);
        }
        if self.max_workers == 0 {
            return Err(AggregatorError::InvalidWorkerCount(self.max_workers));
        }

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(AggregatorError::DuplicateTaskName(task.name.clone()));
            }
        }
        Ok(())
    }
}

/// Runs `tasks` with at most `max_workers` at a time, each limited to `per_task_timeout`
pub async fn run(
    tasks: Vec<AggregationTask>,
    max_workers: usize,
    per_task_timeout: Duration,
) -> Result<AggregationResult, AggregatorError> {
    MultiSourceAggregator::new(max_workers, per_task_timeout)
        .run(tasks)
        .await
}

/// Waits for a worker slot, then runs the operation under the per-task timeout.
///
/// The slot is released as soon as the timeout fires. A timed-out blocking
/// operation keeps running on the blocking pool, so for a while more than
/// `max_workers` operations may be executing.
async fn execute(
    operation: Operation,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
) -> TaskOutcome {
    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return TaskOutcome::Failure(TaskFailure::new(
                FailureKind::Error,
                "worker pool closed",
            ))
        }
    };

    let run = async move {
        match operation {
            Operation::Async(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => TaskOutcome::Success(value),
                Ok(Err(reason)) => failure(FailureKind::Error, reason),
                Err(panic) => failure(FailureKind::Panicked, panic_message(panic.as_ref())),
            },
            Operation::Blocking(f) => match tokio::task::spawn_blocking(f).await {
                Ok(Ok(value)) => TaskOutcome::Success(value),
                Ok(Err(reason)) => failure(FailureKind::Error, reason),
                Err(e) if e.is_panic() => {
                    failure(FailureKind::Panicked, panic_message(e.into_panic().as_ref()))
                }
                Err(e) => failure(FailureKind::Error, e.to_string()),
            },
        }
    };

    let outcome = match tokio::time::timeout(timeout, run).await {
        Ok(outcome) => outcome,
        Err(_) => failure(FailureKind::Timeout, format!("no response within {:?}", timeout)),
    };
    drop(permit);
    outcome
}

fn failure(kind: FailureKind, reason: impl Into<String>) -> TaskOutcome {
    TaskOutcome::Failure(TaskFailure::new(kind, reason))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
