//! Run coordinator: expand, validate and dispatch jobs with bounded
//! concurrency.
//!
//! Every concrete job becomes one pipeline (`staleness → execute`). A
//! semaphore with `concurrency` permits is acquired in FIFO order before a
//! pipeline is spawned, so jobs start in configuration order. Pipelines
//! never fail the run: each produces a [`JobOutcome`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinSet};

use bckp_core::{config, Job, JobId, JobOutcome};
use bckp_engine::{expand, staleness, EngineError, Staleness};

use crate::error::RunnerError;
use crate::executor::Executor;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub concurrency: usize,
    pub force: bool,
    pub progress_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: config::default_concurrency(),
            force: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Interrupt
// ---------------------------------------------------------------------------

/// Cloneable stop signal. Once triggered, jobs that have not started are
/// reported as interrupted; running jobs finish.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Trigger on ctrl-c. Must be called inside a tokio runtime.
    pub fn listen_for_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("received ctrl-c; waiting for running jobs to finish");
                    interrupt.trigger();
                }
                Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per concrete job (or per wildcard job that failed to expand),
    /// in dispatch order.
    pub outcomes: Vec<(JobId, JobOutcome)>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn count(&self, predicate: impl Fn(&JobOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    /// `(job, message)` for every job that failed or never started.
    pub fn errors(&self) -> Vec<(&JobId, String)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                JobOutcome::Failed { error } => Some((id, error.clone())),
                JobOutcome::Interrupted => Some((id, "interrupted".to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn into_result(self) -> Result<RunReport, RunnerError> {
        let (failed, first) = {
            let errors = self.errors();
            let first = errors.first().map(|(id, message)| format!("{id}: {message}"));
            (errors.len(), first)
        };
        match first {
            None => Ok(self),
            Some(first) => Err(RunnerError::JobsFailed {
                failed,
                total: self.outcomes.len(),
                first,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    options: RunOptions,
    executor: Arc<Executor>,
    interrupt: Interrupt,
}

impl Coordinator {
    pub fn new(options: RunOptions, executor: Executor) -> Self {
        Self {
            options,
            executor: Arc::new(executor),
            interrupt: Interrupt::default(),
        }
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Run every enabled job. Only configuration problems (colliding
    /// artifacts) are returned as `Err`, before anything is dispatched.
    pub async fn run(&self, jobs: Vec<Job>) -> Result<RunReport, RunnerError> {
        let started = Instant::now();
        let enabled: Vec<Job> = jobs.into_iter().filter(|job| !job.disabled).collect();

        let expansion = tokio::task::spawn_blocking(move || {
            let expansion = expand::expand_all(&enabled);
            expand::check_collisions(&expansion.jobs).map(|()| expansion)
        })
        .await
        .map_err(|err| RunnerError::Protocol(format!("expansion join error: {err}")))??;

        let mut outcomes: Vec<(JobId, JobOutcome)> = expansion
            .failures
            .into_iter()
            .map(|(id, err)| {
                let outcome = JobOutcome::Failed {
                    error: err.to_string(),
                };
                (id, outcome)
            })
            .collect();
        let base = outcomes.len();
        let total = expansion.jobs.len();
        outcomes.extend(
            expansion
                .jobs
                .iter()
                .map(|job| (job.id.clone(), JobOutcome::Interrupted)),
        );

        let concurrency = self.options.concurrency.max(1);
        tracing::info!(jobs = total, concurrency, force = self.options.force, "starting run");

        let completed = Arc::new(AtomicUsize::new(0));
        let ticker = spawn_progress(completed.clone(), total, self.options.progress_interval);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut pipelines: JoinSet<(usize, JobOutcome)> = JoinSet::new();

        for (index, job) in expansion.jobs.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.interrupt.wait() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !self.interrupt.is_triggered()) else {
                tracing::info!(job = %job.id, "not started: run interrupted");
                continue;
            };

            let executor = self.executor.clone();
            let force = self.options.force;
            let completed = completed.clone();
            pipelines.spawn(async move {
                let outcome = settle(tokio::spawn(pipeline(job, force, executor)).await);
                completed.fetch_add(1, Ordering::SeqCst);
                drop(permit);
                (index, outcome)
            });
        }

        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[base + index].1 = outcome,
                Err(err) => tracing::error!(error = %err, "pipeline task join failure"),
            }
        }
        ticker.abort();

        let report = RunReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            succeeded = report.count(|o| matches!(o, JobOutcome::Succeeded { .. })),
            skipped = report.count(|o| matches!(o, JobOutcome::Skipped)),
            failed = report.count(|o| matches!(o, JobOutcome::Failed { .. })),
            interrupted = report.count(|o| matches!(o, JobOutcome::Interrupted)),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }
}

/// A pipeline task that panicked or was cancelled still yields an outcome.
fn settle(joined: Result<JobOutcome, JoinError>) -> JobOutcome {
    joined.unwrap_or_else(|err| {
        tracing::error!(error = %err, "pipeline task failed");
        JobOutcome::Failed {
            error: format!("pipeline task failed: {err}"),
        }
    })
}

async fn pipeline(job: Job, force: bool, executor: Arc<Executor>) -> JobOutcome {
    let id = job.id.clone();
    let check_job = job.clone();
    let staleness = tokio::task::spawn_blocking(move || staleness::check(&check_job, force))
        .await
        .map_err(|err| RunnerError::Protocol(format!("staleness join error: {err}")))
        .and_then(|r: Result<Staleness, EngineError>| r.map_err(RunnerError::from));

    match staleness {
        Ok(Staleness::Fresh) => {
            tracing::info!(job = %id, "fresh, skipping");
            return JobOutcome::Skipped;
        }
        Ok(signal) => tracing::info!(job = %id, staleness = ?signal, "backing up"),
        Err(err) => {
            tracing::error!(job = %id, error = %err, "staleness check failed");
            return JobOutcome::Failed {
                error: err.to_string(),
            };
        }
    }

    match executor.execute(job).await {
        Ok(artifact) => JobOutcome::Succeeded { artifact },
        Err(err) => {
            tracing::error!(job = %id, error = %err, "job failed");
            JobOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

fn spawn_progress(
    completed: Arc<AtomicUsize>,
    total: usize,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;
        let mut last = 0;
        loop {
            interval.tick().await;
            let done = completed.load(Ordering::SeqCst);
            if done != last {
                tracing::info!(completed = done, total, "progress");
                last = done;
            }
        }
    })
}
