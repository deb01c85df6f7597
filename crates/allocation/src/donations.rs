//! Donation intake and appointment approval.
//!
//! Every donation becomes one dated lot in its city's ledger. Writes go
//! through the city lock so they never interleave with an allocation pass.

use chrono::Utc;
use hemobank_core::error::InventoryError;
use hemobank_core::{
    CityBatch, CityInventory, Donation, DonationSchedule, Donor, DomainEvent, EventBus, Result,
    Store,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::locks::CityLocks;

/// Result of approving a booked appointment.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleApproval {
    pub schedule: DonationSchedule,
    pub donation: Donation,
    pub donor: Donor,
}

pub struct DonationDesk {
    store: Arc<dyn Store>,
    locks: Arc<CityLocks>,
    events: Arc<EventBus>,
}

impl DonationDesk {
    pub fn new(store: Arc<dyn Store>, locks: Arc<CityLocks>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            locks,
            events,
        }
    }

    /// Add a donation to its city's ledger, creating the inventory on first
    /// donation. A linked donor has the donation recorded against them.
    pub async fn record(&self, donation: &Donation) -> Result<CityInventory> {
        if donation.units == 0 {
            return Err(InventoryError::InvalidQuantity(0).into());
        }

        let _guard = self.locks.lock(&donation.city).await;
        self.credit(donation, None).await
    }

    /// Commit a donation lot, the donor update and the closed `schedule` as
    /// one batch. The caller holds the city lock.
    async fn credit(
        &self,
        donation: &Donation,
        schedule: Option<DonationSchedule>,
    ) -> Result<CityInventory> {
        let mut inventory = self
            .store
            .inventory(&donation.city)
            .await?
            .unwrap_or_else(|| CityInventory::new(&donation.city));
        inventory.add_lot(donation.blood_type, donation.units, donation.donated_on)?;

        let mut batch = CityBatch::new(inventory);
        if let Some(donor_id) = &donation.donor_id {
            match self.store.donor(donor_id).await? {
                Some(mut donor) => {
                    donor.record_donation(donation.donated_on);
                    batch.donors.push(donor);
                }
                None => warn!(donor_id = %donor_id, "Donation linked to unknown donor"),
            }
        }
        batch.schedules.extend(schedule);

        let mut inventory = batch.inventory.clone();
        self.store.commit(batch).await?;
        inventory.version += 1;

        info!(
            city = %donation.city,
            blood_type = %donation.blood_type,
            units = donation.units,
            donor = %donation.donor_name,
            "Donation recorded"
        );
        self.events.publish(DomainEvent::DonationRecorded {
            city: donation.city.clone(),
            blood_type: donation.blood_type,
            units: donation.units,
            timestamp: Utc::now(),
        });

        Ok(inventory)
    }

    /// Turn a pending appointment into a one-unit donation dated on the
    /// appointment day, credited to the donor's city.
    ///
    /// The completion check and the credit happen under the city lock and
    /// land in one batch, so an appointment is credited at most once.
    /// A schedule whose donor has since disappeared is closed without a
    /// donation and reported as `DonorNotFound`.
    pub async fn approve(&self, schedule_id: &str) -> Result<ScheduleApproval> {
        let schedule = self.open_schedule(schedule_id).await?;

        let Some(donor) = self.store.donor(&schedule.donor_id).await? else {
            let mut schedule = schedule;
            schedule.completed = true;
            self.store.save_schedule(&schedule).await?;
            warn!(schedule_id = %schedule.id, donor_id = %schedule.donor_id, "Closed schedule for missing donor");
            return Err(InventoryError::DonorNotFound(schedule.donor_id).into());
        };

        let _guard = self.locks.lock(&donor.city).await;
        let mut schedule = self.open_schedule(schedule_id).await?;
        schedule.completed = true;

        let mut donation = Donation::new(
            &donor.name,
            &donor.city,
            donor.blood_type,
            1,
            schedule.scheduled_on,
        );
        donation.donor_id = Some(donor.id.clone());
        self.credit(&donation, Some(schedule.clone())).await?;

        let donor = self
            .store
            .donor(&donor.id)
            .await?
            .ok_or_else(|| InventoryError::DonorNotFound(donor.id.clone()))?;

        info!(schedule_id = %schedule.id, donor_id = %donor.id, "Donation schedule approved");
        Ok(ScheduleApproval {
            schedule,
            donation,
            donor,
        })
    }

    async fn open_schedule(&self, schedule_id: &str) -> Result<DonationSchedule> {
        let schedule = self
            .store
            .schedule(schedule_id)
            .await?
            .ok_or_else(|| InventoryError::ScheduleNotFound(schedule_id.to_string()))?;
        if schedule.completed {
            return Err(InventoryError::ScheduleAlreadyCompleted(schedule.id).into());
        }
        Ok(schedule)
    }
}
