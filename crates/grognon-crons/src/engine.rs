use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{CronError, Result};
use crate::infer::conform_row;
use crate::manager::CronManager;
use crate::types::{Cron, OutputColumn};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due crons whose connection had no live handle.
    pub skipped: usize,
}

const MIN_TICK: Duration = Duration::from_millis(10);

enum RunOutcome {
    Stored(usize),
    Skipped,
}

/// Periodically runs every due cron and appends its rows.
pub struct CronEngine {
    crons: Arc<CronManager>,
    tick: Duration,
}

impl CronEngine {
    pub fn new(crons: Arc<CronManager>, tick: Duration) -> Self {
        Self {
            crons,
            tick: tick.max(MIN_TICK),
        }
    }

    /// Main loop. Sweeps immediately, then once per tick, until `shutdown`
    /// broadcasts `true` or its sender is dropped.
    ///
    /// Sweeps run on the blocking pool. A sweep in progress is allowed to
    /// finish before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_ms = self.tick.as_millis() as u64, "cron engine started");
        let engine = Arc::new(self);

        let mut interval = tokio::time::interval(engine.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sweeper = Arc::clone(&engine);
                    match tokio::task::spawn_blocking(move || sweeper.sweep()).await {
                        Ok(Ok(report)) if report.due > 0 => info!(
                            due = report.due,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            skipped = report.skipped,
                            "cron sweep finished"
                        ),
                        Ok(Ok(_)) => debug!("no cron due"),
                        Ok(Err(e)) => error!("cron sweep failed: {e}"),
                        Err(e) => error!("cron sweep task aborted: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("cron engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run every cron due now.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now())
    }

    /// Run every cron due at `now`, stamping each attempt with `now`.
    ///
    /// Only listing the due crons can fail the sweep; a failing cron is
    /// logged and counted, and the remaining crons still run.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.crons.due(now)?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for cron in &due {
            match self.run_cron(cron, now) {
                Ok(RunOutcome::Stored(rows)) => {
                    debug!(cron_id = cron.id, rows, "cron run stored");
                    report.succeeded += 1;
                }
                Ok(RunOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(cron_id = cron.id, "cron run failed: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn run_cron(&self, cron: &Cron, now: DateTime<Utc>) -> Result<RunOutcome> {
        let Some(handle) = self.crons.registry().handle(cron.connection_id) else {
            warn!(
                cron_id = cron.id,
                connection_id = cron.connection_id,
                "connection not live, cron skipped"
            );
            return Ok(RunOutcome::Skipped);
        };

        // Stamped before running: a failed attempt still waits a full interval.
        self.crons.stamp_last_run(cron.id, now)?;

        let output = handle.query(&cron.command, self.crons.query_timeout())?;
        let columns: Vec<OutputColumn> = self
            .crons
            .outputs(cron.id)?
            .iter()
            .map(|o| o.column())
            .collect();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        if output.columns != names {
            return Err(CronError::Execution {
                id: cron.id,
                reason: format!(
                    "query returned columns {:?}, table stores {:?}",
                    output.columns, names
                ),
            });
        }

        let rows = output
            .rows
            .iter()
            .map(|row| conform_row(cron.id, &columns, row))
            .collect::<Result<Vec<_>>>()?;
        let stored = self.crons.tables().append(cron.id, &columns, now, &rows)?;
        Ok(RunOutcome::Stored(stored))
    }
}
