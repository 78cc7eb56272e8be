//! Background orchestrator loop.
//!
//! One thread per process. Each tick processes a batch of pending jobs; on
//! the coarser sweep cadence it also processes due scheduled jobs and
//! releases stale claims. Shutdown is observed between jobs only, so a claim
//! is never abandoned mid-flight by the loop itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::audit::AuditSink;
use crate::config::OrchestratorConfig;
use crate::maintenance::JobMaintenance;
use crate::orchestrator::{BatchReport, PublishingOrchestrator};

/// Handle to control a running worker.
#[derive(Debug)]
pub struct OrchestratorWorkerHandle {
    stop: Arc<AtomicBool>,
    wake: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl OrchestratorWorkerHandle {
    /// Request graceful shutdown and wait for the current job to finish.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub ticks: u64,
    pub sweeps: u64,
    pub jobs_published: u64,
    pub jobs_awaiting_approval: u64,
    pub retries_scheduled: u64,
    pub jobs_failed: u64,
    pub jobs_skipped: u64,
    pub errors: u64,
    pub stale_released: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn absorb(&mut self, report: &BatchReport) {
        self.jobs_published += report.published as u64;
        self.jobs_awaiting_approval += report.awaiting_approval as u64;
        self.retries_scheduled += report.retry_scheduled as u64;
        self.jobs_failed += report.failed as u64;
        self.jobs_skipped += report.skipped as u64;
        self.errors += report.errors as u64;
    }
}

pub struct OrchestratorWorker;

impl OrchestratorWorker {
    pub fn spawn(
        orchestrator: Arc<PublishingOrchestrator>,
        maintenance: Arc<JobMaintenance>,
        audit: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> std::io::Result<OrchestratorWorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let worker = Worker {
            orchestrator,
            maintenance,
            audit,
            config,
            stop: stop.clone(),
            stats: stats.clone(),
        };

        let join = thread::Builder::new()
            .name(worker.config.name.clone())
            .spawn(move || worker.run(wake_rx))?;

        Ok(OrchestratorWorkerHandle {
            stop,
            wake: wake_tx,
            join: Some(join),
            stats,
        })
    }
}

struct Worker {
    orchestrator: Arc<PublishingOrchestrator>,
    maintenance: Arc<JobMaintenance>,
    audit: Arc<dyn AuditSink>,
    config: OrchestratorConfig,
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl Worker {
    fn run(self, wake: mpsc::Receiver<()>) {
        info!(
            worker = %self.config.name,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            due_sweep_interval_secs = self.config.due_sweep_interval.as_secs(),
            batch_size = self.config.batch_size,
            "orchestrator worker started"
        );
        let started = Instant::now();
        let mut last_sweep: Option<Instant> = None;

        while !self.stopping() {
            self.tick();

            if last_sweep.is_none_or(|at| at.elapsed() >= self.config.due_sweep_interval) {
                self.sweep();
                last_sweep = Some(Instant::now());
            }

            self.with_stats(|s| s.uptime_secs = started.elapsed().as_secs());

            match wake.recv_timeout(self.config.poll_interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        self.audit.flush();
        info!(worker = %self.config.name, "orchestrator worker stopped");
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.with_stats(|s| s.ticks += 1);
        match self.orchestrator.list_pending_job_ids(None) {
            Ok(refs) => self.run_batch(&refs),
            Err(err) => {
                error!(worker = %self.config.name, error = %err, "failed to list pending jobs");
                self.with_stats(|s| s.errors += 1);
            }
        }
    }

    fn sweep(&self) {
        self.with_stats(|s| s.sweeps += 1);
        if self.stopping() {
            return;
        }

        match self.orchestrator.list_due_scheduled_job_ids(None) {
            Ok(refs) => self.run_batch(&refs),
            Err(err) => {
                error!(worker = %self.config.name, error = %err, "failed to list due scheduled jobs");
                self.with_stats(|s| s.errors += 1);
            }
        }

        if let Some(after) = self.config.stale_claim_after {
            match self.maintenance.release_stale_claims(None, after, None) {
                Ok(released) => self.with_stats(|s| s.stale_released += released.len() as u64),
                Err(err) => {
                    error!(worker = %self.config.name, error = %err, "failed to release stale claims");
                    self.with_stats(|s| s.errors += 1);
                }
            }
        }
    }

    fn run_batch(&self, refs: &[crate::jobs::JobRef]) {
        if refs.is_empty() {
            return;
        }
        let report = self.orchestrator.process_batch(refs, &|| self.stopping());
        if report.processed() > 0 || report.errors > 0 {
            info!(
                worker = %self.config.name,
                published = report.published,
                awaiting_approval = report.awaiting_approval,
                retry_scheduled = report.retry_scheduled,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors,
                "batch processed"
            );
        }
        self.with_stats(|s| s.absorb(&report));
    }

    fn with_stats(&self, f: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}
