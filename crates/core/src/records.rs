//! Allotments, donations and donation schedules.

use crate::blood::BloodType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllotmentStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Record of units handed to a receiver in one allocation event.
///
/// Immutable once written, apart from a `Pending` allotment settling into
/// `Completed` or `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allotment {
    pub id: String,
    pub receiver_id: String,
    pub city: String,
    pub blood_type: BloodType,
    pub units_allotted: u32,
    pub allotted_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: AllotmentStatus,
}

impl Allotment {
    pub fn new(
        receiver_id: impl Into<String>,
        city: impl Into<String>,
        blood_type: BloodType,
        units_allotted: u32,
        allotted_on: NaiveDate,
        status: AllotmentStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            receiver_id: receiver_id.into(),
            city: city.into(),
            blood_type,
            units_allotted,
            allotted_on,
            created_at: Utc::now(),
            status,
        }
    }

    /// Move a pending allotment to its final state.
    ///
    /// Returns `false` (and changes nothing) when the allotment has already
    /// settled or `to` is not a final state.
    pub fn settle(&mut self, to: AllotmentStatus) -> bool {
        if self.status != AllotmentStatus::Pending || to == AllotmentStatus::Pending {
            return false;
        }
        self.status = to;
        true
    }
}

/// Units handed out against a receiver's open transfusion.
///
/// Partial service stays `Pending` until the transfusion is fully covered,
/// so only pending allotments count against the current due date.
pub fn pending_units(allotments: &[Allotment]) -> u32 {
    allotments
        .iter()
        .filter(|a| a.status == AllotmentStatus::Pending)
        .map(|a| a.units_allotted)
        .sum()
}

/// Blood collected from a donor, entering a city's inventory as one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_id: Option<String>,
    pub donor_name: String,
    pub city: String,
    pub blood_type: BloodType,
    pub units: u32,
    pub donated_on: NaiveDate,
}

impl Donation {
    pub fn new(
        donor_name: impl Into<String>,
        city: impl Into<String>,
        blood_type: BloodType,
        units: u32,
        donated_on: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            donor_id: None,
            donor_name: donor_name.into(),
            city: city.into(),
            blood_type,
            units,
            donated_on,
        }
    }
}

/// A booked donor appointment awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationSchedule {
    pub id: String,
    pub donor_id: String,
    pub scheduled_on: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub completed: bool,
}

impl DonationSchedule {
    pub fn new(
        donor_id: impl Into<String>,
        scheduled_on: NaiveDate,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            donor_id: donor_id.into(),
            scheduled_on,
            location: location.into(),
            completed: false,
        }
    }
}
