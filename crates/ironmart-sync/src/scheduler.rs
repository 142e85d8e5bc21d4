//! # Job Scheduler
//!
//! Runs each registered [`JobDefinition`] on its own cadence.
//!
//! ## Execution Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scheduler                                       │
//! │                                                                         │
//! │   one tokio task per job                                               │
//! │   ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐  │
//! │   │ voucher_pull │ │ stock_reset  │ │ health_check │ │ order_cleanup│  │
//! │   └──────┬───────┘ └──────┬───────┘ └──────┬───────┘ └──────┬───────┘  │
//! │          │ sleep until cadence.next_after(now, tz)            │         │
//! │          ▼                                                    ▼         │
//! │   run_job: try_lock ── held? → AlreadyRunning                          │
//! │            settings snapshot from DB                                   │
//! │            Tally job + disabled? → Disabled                            │
//! │            handler.run(ctx) ── error? → Failed (logged, loop goes on)  │
//! │                                                                         │
//! │   run_now(kind) from the admin API goes through the same run_job.      │
//! │   Shutdown: watch channel; a run in progress finishes first.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ironmart_core::{Cadence, JobKind, RunTrigger, RuntimeSettings};
use ironmart_db::{Database, TALLY_SYNC_ENABLED};

use crate::error::{SyncError, SyncResult};
use crate::jobs::{JobContext, JobHandler, JobRunOutcome};

/// A job and when it runs.
#[derive(Clone)]
pub struct JobDefinition {
    pub kind: JobKind,
    pub cadence: Cadence,
    pub handler: Arc<dyn JobHandler>,
}

struct RegisteredJob {
    definition: JobDefinition,
    running: Mutex<()>,
}

pub struct Scheduler {
    db: Arc<Database>,
    tz: Tz,
    /// Used when the database has no `tally_sync_enabled` row.
    default_enabled: bool,
    jobs: HashMap<JobKind, Arc<RegisteredJob>>,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, tz: Tz, default_enabled: bool) -> Self {
        Scheduler {
            db,
            tz,
            default_enabled,
            jobs: HashMap::new(),
        }
    }

    /// Adds a job, replacing any earlier definition of the same kind.
    pub fn register(&mut self, definition: JobDefinition) -> SyncResult<()> {
        definition.cadence.validate()?;
        debug!(job = %definition.kind, cadence = %definition.cadence, "Registered job");
        self.jobs.insert(
            definition.kind,
            Arc::new(RegisteredJob {
                definition,
                running: Mutex::new(()),
            }),
        );
        Ok(())
    }

    /// Registered jobs in a stable order.
    pub fn jobs(&self) -> Vec<(JobKind, Cadence)> {
        JobKind::ALL
            .iter()
            .filter_map(|kind| self.jobs.get(kind))
            .map(|job| (job.definition.kind, job.definition.cadence))
            .collect()
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub async fn runtime_settings(&self) -> SyncResult<RuntimeSettings> {
        let enabled = self.db.settings().get_bool(TALLY_SYNC_ENABLED).await?;
        Ok(RuntimeSettings {
            tally_sync_enabled: enabled.unwrap_or(self.default_enabled),
        })
    }

    /// Runs a job immediately, outside its cadence.
    pub async fn run_now(&self, kind: JobKind, trigger: RunTrigger) -> SyncResult<JobRunOutcome> {
        let job = self
            .jobs
            .get(&kind)
            .ok_or_else(|| SyncError::UnknownJob(kind.to_string()))?;
        Ok(self.run_job(job, trigger).await)
    }

    async fn run_job(&self, job: &RegisteredJob, trigger: RunTrigger) -> JobRunOutcome {
        let kind = job.definition.kind;

        let Ok(_running) = job.running.try_lock() else {
            debug!(job = %kind, trigger = trigger.as_str(), "Previous run still in progress");
            return JobRunOutcome::AlreadyRunning;
        };

        let settings = match self.runtime_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(job = %kind, error = %e, "Could not read runtime settings");
                return JobRunOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if kind.requires_tally() && !settings.tally_sync_enabled {
            debug!(job = %kind, "Tally sync disabled, skipping");
            return JobRunOutcome::Disabled;
        }

        let ctx = JobContext { trigger, settings };
        let started = Instant::now();

        match job.definition.handler.run(&ctx).await {
            Ok(output) => {
                info!(
                    job = %kind,
                    trigger = trigger.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                JobRunOutcome::Completed { output }
            }
            Err(e) => {
                error!(
                    job = %kind,
                    trigger = trigger.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Job failed"
                );
                JobRunOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Spawns one loop per registered job.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = JobKind::ALL
            .iter()
            .filter_map(|kind| self.jobs.get(kind).cloned())
            .map(|job| {
                let scheduler = Arc::clone(&self);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { scheduler.job_loop(job, shutdown).await })
            })
            .collect::<Vec<_>>();

        info!(jobs = tasks.len(), timezone = %self.tz, "Scheduler started");
        SchedulerHandle { shutdown_tx, tasks }
    }

    async fn job_loop(&self, job: Arc<RegisteredJob>, mut shutdown: watch::Receiver<bool>) {
        let kind = job.definition.kind;

        loop {
            let delay = job.definition.cadence.delay_until_next(Utc::now(), self.tz);
            debug!(job = %kind, next_in_secs = delay.as_secs(), "Next run scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.run_job(&job, RunTrigger::Scheduled).await;
                }
                _ = shutdown.changed() => break,
            }

            if *shutdown.borrow() {
                break;
            }
        }

        debug!(job = %kind, "Job loop stopped");
    }
}

// =============================================================================
// Scheduler Handle
// =============================================================================

/// Stops the job loops started by [`Scheduler::start`].
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals every loop and waits for in-flight runs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Job loop panicked");
            }
        }
        info!("Scheduler stopped");
    }
}
