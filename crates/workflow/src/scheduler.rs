//! Daily Assignment Scheduler.
//!
//! A cycle visits every known city. Within a city, receivers due inside the
//! lookahead window are served in `next_due_date` order, each through the
//! same fulfilment path the intake desk uses. A city's changes are committed
//! as one batch while its lock is held; cities run concurrently.
//!
//! Demand is tracked per due transfusion: partial service is recorded as
//! `Pending` allotments that count against `required_units` on every later
//! cycle until the transfusion is covered. The receiver is then advanced to
//! its next due date and every pending allotment settles as `Completed`, so
//! re-running a day is a no-op for it.

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use hemobank_allocation::{CityLocks, fulfil};
use hemobank_config::SchedulerConfig;
use hemobank_core::error::InventoryError;
use hemobank_core::people::add_days;
use hemobank_core::records::pending_units;
use hemobank_core::{
    Allotment, AllotmentStatus, BloodType, CityBatch, DomainEvent, EventBus, Error, Receiver,
    RefillPolicy, Result, Store,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Receivers due up to `as_of + lookahead_days` are served.
    pub lookahead_days: u32,
    pub refill: RefillPolicy,
    pub max_parallel_cities: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead_days: 1,
            refill: RefillPolicy::Immediate,
            max_parallel_cities: 4,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            lookahead_days: config.lookahead_days,
            refill: config.refill,
            max_parallel_cities: config.max_parallel_cities.max(1),
        }
    }
}

/// What one receiver got in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiverOutcome {
    pub receiver_id: String,
    pub name: String,
    pub blood_type: BloodType,
    /// Units still owed for the current transfusion when the receiver was reached.
    pub outstanding: u32,
    pub allotted: u32,
    pub deficit: u32,
    pub engaged_donors: Vec<String>,
    /// `None` when nothing was allotted.
    pub status: Option<AllotmentStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CityReport {
    pub city: String,
    pub receivers: Vec<ReceiverOutcome>,
}

impl CityReport {
    pub fn units_allotted(&self) -> u32 {
        self.receivers.iter().map(|r| r.allotted).sum()
    }

    pub fn deficit(&self) -> u32 {
        self.receivers.iter().map(|r| r.deficit).sum()
    }

    pub fn donors_engaged(&self) -> usize {
        self.receivers.iter().map(|r| r.engaged_donors.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedCity {
    pub city: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedCity {
    pub city: String,
    pub error: String,
}

/// Outcome of a whole cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub as_of: NaiveDate,
    /// Cities processed to completion, sorted by name.
    pub cities: Vec<CityReport>,
    pub skipped: Vec<SkippedCity>,
    pub failed: Vec<FailedCity>,
    /// Cities not started because the run was cancelled.
    pub cancelled: Vec<String>,
}

impl CycleReport {
    pub fn units_allotted(&self) -> u32 {
        self.cities.iter().map(CityReport::units_allotted).sum()
    }

    pub fn deficit(&self) -> u32 {
        self.cities.iter().map(CityReport::deficit).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

enum CityRun {
    Done(CityReport),
    Skipped(SkippedCity),
    Failed(FailedCity),
    Cancelled(String),
}

pub struct AssignmentScheduler {
    store: Arc<dyn Store>,
    locks: Arc<CityLocks>,
    events: Arc<EventBus>,
    settings: SchedulerSettings,
}

impl AssignmentScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<CityLocks>,
        events: Arc<EventBus>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            locks,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Run one full cycle for `as_of`.
    ///
    /// Only listing the cities can fail the cycle itself; per-city failures
    /// are reported in [`CycleReport::failed`] and do not stop other cities.
    pub async fn run_cycle(&self, as_of: NaiveDate) -> Result<CycleReport> {
        let (_tx, never) = watch::channel(false);
        self.run_cycle_until(as_of, never).await
    }

    /// [`run_cycle`](Self::run_cycle), stopping before any city not yet
    /// started once `shutdown` turns `true`. A started city always finishes.
    pub async fn run_cycle_until(
        &self,
        as_of: NaiveDate,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport> {
        let mut cities: BTreeSet<String> = self.store.cities().await?.into_iter().collect();
        cities.extend(self.store.receiver_cities().await?);

        info!(%as_of, cities = cities.len(), "Assignment cycle started");

        let runs: Vec<CityRun> = futures::stream::iter(cities)
            .map(|city| {
                let shutdown = shutdown.clone();
                async move {
                    if *shutdown.borrow() {
                        return CityRun::Cancelled(city);
                    }
                    self.run_city(city, as_of).await
                }
            })
            .buffer_unordered(self.settings.max_parallel_cities.max(1))
            .collect()
            .await;

        let mut report = CycleReport {
            as_of,
            cities: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        };
        for run in runs {
            match run {
                CityRun::Done(city) => report.cities.push(city),
                CityRun::Skipped(skip) => report.skipped.push(skip),
                CityRun::Failed(fail) => report.failed.push(fail),
                CityRun::Cancelled(city) => report.cancelled.push(city),
            }
        }
        report.cities.sort_by(|a, b| a.city.cmp(&b.city));
        report.skipped.sort_by(|a, b| a.city.cmp(&b.city));
        report.failed.sort_by(|a, b| a.city.cmp(&b.city));
        report.cancelled.sort();

        info!(
            %as_of,
            processed = report.cities.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            units = report.units_allotted(),
            deficit = report.deficit(),
            "Assignment cycle completed"
        );
        self.events.publish(DomainEvent::CycleCompleted {
            as_of,
            cities_processed: report.cities.len(),
            cities_failed: report.failed.len(),
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    /// Cancel a receiver's pending allotment so it stops counting against
    /// their open transfusion. Runs under the receiver's city lock.
    pub async fn cancel_allotment(&self, receiver_id: &str, allotment_id: &str) -> Result<Allotment> {
        let receiver = self
            .store
            .receiver(receiver_id)
            .await?
            .ok_or_else(|| InventoryError::ReceiverNotFound(receiver_id.to_string()))?;
        let _guard = self.locks.lock(&receiver.city).await;

        let mut allotment = self
            .store
            .allotments_for(receiver_id)
            .await?
            .into_iter()
            .find(|a| a.id == allotment_id)
            .ok_or_else(|| InventoryError::AllotmentNotFound(allotment_id.to_string()))?;
        if !allotment.settle(AllotmentStatus::Cancelled) {
            return Err(InventoryError::AllotmentSettled(allotment.id).into());
        }
        self.store.save_allotment(&allotment).await?;

        info!(
            receiver_id,
            allotment_id,
            units = allotment.units_allotted,
            "Pending allotment cancelled"
        );
        Ok(allotment)
    }

    async fn run_city(&self, city: String, as_of: NaiveDate) -> CityRun {
        match self.process_city(&city, as_of).await {
            Ok(Some(report)) => CityRun::Done(report),
            Ok(None) => CityRun::Done(CityReport {
                city,
                receivers: Vec::new(),
            }),
            Err(Error::Inventory(InventoryError::CityNotFound(_))) => {
                let reason = "no blood bank inventory".to_string();
                warn!(city = %city, "City has due receivers but no inventory, skipping");
                self.events.publish(DomainEvent::CitySkipped {
                    city: city.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                CityRun::Skipped(SkippedCity { city, reason })
            }
            Err(e) => {
                error!(city = %city, error = %e, "City batch failed");
                CityRun::Failed(FailedCity {
                    city,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Serve one city's due receivers and commit the batch.
    ///
    /// `Ok(None)` when nobody was due.
    async fn process_city(&self, city: &str, as_of: NaiveDate) -> Result<Option<CityReport>> {
        let _guard = self.locks.lock(city).await;

        let horizon = add_days(as_of, self.settings.lookahead_days);
        let mut due = self.store.receivers_due(city, horizon).await?;
        if due.is_empty() {
            return Ok(None);
        }
        due.sort_by(Receiver::due_order);

        let inventory = self
            .store
            .inventory(city)
            .await?
            .ok_or_else(|| InventoryError::CityNotFound(city.to_string()))?;
        let mut donors = self.store.donors_in(city).await?;

        let mut batch = CityBatch::new(inventory);
        let mut touched_donors: HashSet<String> = HashSet::new();
        let mut events = Vec::new();
        let mut report = CityReport {
            city: city.to_string(),
            receivers: Vec::with_capacity(due.len()),
        };

        for mut receiver in due {
            let history = self.store.allotments_for(&receiver.id).await?;
            let outstanding = receiver.required_units.saturating_sub(pending_units(&history));

            let fulfilment = fulfil(
                &mut batch.inventory,
                &mut donors,
                receiver.blood_type,
                outstanding,
                as_of,
                self.settings.refill,
            );
            let allotted = fulfilment.satisfied();
            let deficit = fulfilment.deficit();

            let status = if deficit == 0 {
                receiver.complete_transfusion(as_of);
                batch.receivers.push(receiver.clone());
                for mut earlier in history {
                    if earlier.settle(AllotmentStatus::Completed) {
                        batch.allotments.push(earlier);
                    }
                }
                (allotted > 0).then_some(AllotmentStatus::Completed)
            } else {
                (allotted > 0).then_some(AllotmentStatus::Pending)
            };
            if let Some(status) = status {
                batch.allotments.push(Allotment::new(
                    &receiver.id,
                    city,
                    receiver.blood_type,
                    allotted,
                    as_of,
                    status,
                ));
            }

            let now = Utc::now();
            for donor_id in fulfilment.engaged_donors() {
                touched_donors.insert(donor_id.clone());
                events.push(DomainEvent::DonorEngaged {
                    donor_id: donor_id.clone(),
                    city: city.to_string(),
                    blood_type: receiver.blood_type,
                    timestamp: now,
                });
            }
            events.push(DomainEvent::AllocationCompleted {
                city: city.to_string(),
                receiver_id: Some(receiver.id.clone()),
                blood_type: receiver.blood_type,
                requested: outstanding,
                satisfied: allotted,
                timestamp: now,
            });

            if deficit > 0 {
                warn!(
                    city,
                    receiver_id = %receiver.id,
                    blood_type = %receiver.blood_type,
                    required = outstanding,
                    satisfied = allotted,
                    deficit,
                    "Receiver short of blood"
                );
                events.push(DomainEvent::ShortfallReported {
                    city: city.to_string(),
                    blood_type: receiver.blood_type,
                    deficit,
                    timestamp: now,
                });
            } else {
                info!(
                    city,
                    receiver_id = %receiver.id,
                    blood_type = %receiver.blood_type,
                    units = allotted,
                    next_due = ?receiver.next_due_date,
                    "Receiver served"
                );
            }

            report.receivers.push(ReceiverOutcome {
                receiver_id: receiver.id,
                name: receiver.name,
                blood_type: receiver.blood_type,
                outstanding,
                allotted,
                deficit,
                engaged_donors: fulfilment.engaged_donors().to_vec(),
                status,
            });
        }

        batch.donors = donors
            .into_iter()
            .filter(|d| touched_donors.contains(&d.id))
            .collect();
        self.store.commit(batch).await?;

        for event in events {
            self.events.publish(event);
        }
        Ok(Some(report))
    }
}
