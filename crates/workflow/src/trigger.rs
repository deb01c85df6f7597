//! Recurring trigger for the assignment cycle.
//!
//! Wakes every minute and, when the cron expression matches, runs the same
//! [`AssignmentScheduler::run_cycle_until`] the manual trigger uses, for the
//! current UTC calendar day. Fires at most once per matching minute.

use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cron::CronExpr;
use crate::scheduler::AssignmentScheduler;

pub struct DailyTrigger {
    scheduler: Arc<AssignmentScheduler>,
    schedule: CronExpr,
    tick: Duration,
}

impl DailyTrigger {
    pub fn new(scheduler: Arc<AssignmentScheduler>, schedule: CronExpr) -> Self {
        Self {
            scheduler,
            schedule,
            tick: Duration::from_secs(60),
        }
    }

    pub fn schedule(&self) -> &CronExpr {
        &self.schedule
    }

    /// Whether a tick at `now` should fire, given the last firing.
    fn due(&self, now: &DateTime<Utc>, last_fired: Option<&DateTime<Utc>>) -> bool {
        if !self.schedule.matches(now) {
            return false;
        }
        let minute = |dt: &DateTime<Utc>| (dt.date_naive(), dt.hour(), dt.minute());
        last_fired.is_none_or(|last| minute(last) != minute(now))
    }

    /// Spawn the trigger loop. It exits once `shutdown` turns `true` or its
    /// sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                schedule = %self.schedule,
                next_run = ?self.schedule.next_after(&Utc::now()),
                "Daily assignment trigger started"
            );
            let mut interval = tokio::time::interval(self.tick);
            let mut last_fired: Option<DateTime<Utc>> = None;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Shutdown signalled, stopping assignment trigger");
                            return;
                        }
                        continue;
                    }
                }

                let now = Utc::now();
                if !self.due(&now, last_fired.as_ref()) {
                    continue;
                }
                last_fired = Some(now);

                let as_of = now.date_naive();
                info!(%as_of, "Scheduled assignment cycle triggered");
                match self.scheduler.run_cycle_until(as_of, shutdown.clone()).await {
                    Ok(report) => info!(
                        %as_of,
                        processed = report.cities.len(),
                        units = report.units_allotted(),
                        deficit = report.deficit(),
                        next_run = ?self.schedule.next_after(&now),
                        "Scheduled assignment cycle finished"
                    ),
                    Err(e) => error!(%as_of, error = %e, "Scheduled assignment cycle failed"),
                }
            }
        })
    }
}
