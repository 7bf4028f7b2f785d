use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Run `task` on the blocking pool every `period` until `shutdown`
/// broadcasts `true` or its sender is dropped.
///
/// With `eager` the first run happens immediately, otherwise after one
/// full period. A run in progress is allowed to finish on shutdown.
pub fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    eager: bool,
    mut shutdown: watch::Receiver<bool>,
    task: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let period = period.max(MIN_PERIOD);
    let task = Arc::new(task);

    tokio::spawn(async move {
        let start = if eager {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            task = name,
            period_ms = period.as_millis() as u64,
            eager,
            "background task started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let task = Arc::clone(&task);
                    if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                        error!(task = name, "background run aborted: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(task = name, "background task stopping");
                        break;
                    }
                }
            }
        }
    })
}
