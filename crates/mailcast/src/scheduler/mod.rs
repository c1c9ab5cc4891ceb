//! Recurring batch driver.
//!
//! A background thread owns a current-thread tokio runtime and wakes on a
//! fixed interval, on a manual trigger, or on shutdown. Every wake-up runs
//! one batch pass through [`Scheduler::run_tick`]. Ticks never overlap: a
//! tick that finds another one still running is skipped.

pub mod guard;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn};

pub use guard::{TickGuard, TickPermit};

use crate::config::SchedulerConfig;
use crate::db::job_repo::{self, ExecutionStatus, JobRow};
use crate::db::DatabaseError;
use crate::dispatch::{BatchReport, Dispatcher};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to start scheduler thread: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Scheduler thread panicked")]
    ThreadPanicked,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(BatchReport),
    Failed(String),
    /// Another tick was still running.
    Skipped,
}

#[derive(Clone)]
pub struct Scheduler {
    dispatcher: Dispatcher,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    guard: TickGuard,
}

impl Scheduler {
    pub fn new(dispatcher: Dispatcher, config: SchedulerConfig) -> Self {
        Self {
            dispatcher,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            guard: TickGuard::new(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.config.job_id
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs.max(1))
    }

    fn next_run_after(&self, at: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        at + chrono::Duration::seconds(self.interval().as_secs() as i64)
    }

    /// Persists the job registration, replacing an existing one with the
    /// same id.
    pub fn register(&self) -> Result<JobRow, DatabaseError> {
        let now = self.dispatcher.now();
        let job = job_repo::register(
            self.dispatcher.db(),
            &self.config.job_id,
            self.interval().as_secs(),
            Some(self.next_run_after(now)),
            now,
        )?;
        info!(
            job_id = %job.id,
            interval_secs = job.interval_secs,
            "Registered recurring job"
        );
        Ok(job)
    }

    /// Runs one batch pass unless one is already in progress.
    ///
    /// Failures are logged and recorded in the execution log, never
    /// returned.
    pub fn run_tick(&self) -> TickOutcome {
        let db = self.dispatcher.db();
        let job_id = self.config.job_id.as_str();
        let now = self.dispatcher.now();

        // The execution log references the registration.
        if let Err(e) = job_repo::register_if_missing(db, job_id, self.interval().as_secs(), now) {
            warn!(job_id, error = %e, "Failed to ensure job registration");
        }

        let Some(_permit) = self.guard.try_enter() else {
            warn!(job_id, "Previous run still in progress, skipping this one");
            if let Err(e) = job_repo::record_skipped(db, job_id, now) {
                warn!(job_id, error = %e, "Failed to log skipped run");
            }
            return TickOutcome::Skipped;
        };

        let span = info_span!("tick", job_id);
        let _enter = span.enter();

        let execution_id = match job_repo::start_execution(db, job_id, now) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Failed to open execution log entry");
                None
            }
        };

        let outcome = match self.dispatcher.process_due(now) {
            Ok(report) => TickOutcome::Completed(report),
            Err(e) => {
                error!(error = %e, "Batch pass failed");
                TickOutcome::Failed(e.to_string())
            }
        };

        let finished_at = self.dispatcher.now();
        if let Some(id) = execution_id {
            let (status, message) = match &outcome {
                TickOutcome::Failed(message) => (ExecutionStatus::Error, Some(message.as_str())),
                _ => (ExecutionStatus::Success, None),
            };
            if let Err(e) = job_repo::finish_execution(db, id, status, message, finished_at) {
                warn!(error = %e, "Failed to close execution log entry");
            }
        }
        if let Err(e) = job_repo::set_next_run_time(db, job_id, self.next_run_after(finished_at)) {
            warn!(error = %e, "Failed to update next run time");
        }

        outcome
    }

    /// Starts the loop on a background thread. A message on `trigger_rx`
    /// runs a pass immediately.
    pub fn start(
        &self,
        mut trigger_rx: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let this = self.clone();

        let handle = std::thread::Builder::new()
            .name("mailcast-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut timer = tokio::time::interval(this.interval());
                    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    timer.tick().await; // skip immediate first tick

                    loop {
                        if this.is_stopped() {
                            break;
                        }

                        tokio::select! {
                            _ = timer.tick() => {},
                            Ok(()) = trigger_rx.recv() => {
                                info!("Manual batch run triggered");
                            },
                            _ = this.wake.notified() => {},
                        }

                        if this.is_stopped() {
                            break;
                        }

                        this.run_tick();
                    }
                    info!("Scheduler loop exited");
                });
            })?;

        Ok(handle)
    }

    /// Signals the loop to exit and wakes it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Registers the job, runs the scheduler and blocks until Ctrl-C, then
/// tears the job down. See [`run_until`].
pub fn run_until_interrupted(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    let (interrupt_tx, interrupt_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;
    info!("Press Ctrl-C to exit");
    run_until(scheduler, &interrupt_rx)
}

/// Registers the job, runs the scheduler until `shutdown` yields (or its
/// sender is dropped), then stops the loop and waits for the thread.
///
/// A tick in progress when the signal arrives runs to completion. Once the
/// thread has exited the registration's next run time is cleared.
pub fn run_until(scheduler: &Scheduler, shutdown: &Receiver<()>) -> Result<(), SchedulerError> {
    scheduler.register()?;
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    let handle = scheduler.start(trigger_rx)?;
    info!(
        job_id = scheduler.job_id(),
        interval_secs = scheduler.interval().as_secs(),
        "Scheduler started"
    );

    let _ = shutdown.recv();
    info!("Stopping scheduler");
    scheduler.stop();
    drop(trigger_tx);

    handle.join().map_err(|_| SchedulerError::ThreadPanicked)?;
    job_repo::clear_next_run_time(scheduler.dispatcher.db(), scheduler.job_id())?;
    info!("Scheduler shut down successfully");
    Ok(())
}
