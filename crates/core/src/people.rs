//! Donors and receivers.

use crate::blood::BloodType;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Default days between two donations by the same donor (~3 months).
pub const DEFAULT_DONATION_INTERVAL_DAYS: u32 = 90;

/// Default days between two transfusions for a receiver (~3 weeks).
pub const DEFAULT_TRANSFUSION_INTERVAL_DAYS: u32 = 21;

/// `date + days`, saturating at the calendar's end.
pub fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonorStatus {
    #[default]
    Active,
    Ineligible,
    Deferred,
}

/// A registered blood donor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub id: String,
    pub name: String,
    pub city: String,
    pub blood_type: BloodType,
    #[serde(default)]
    pub status: DonorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_donation_date: Option<NaiveDate>,
    #[serde(default = "default_donation_interval")]
    pub donation_interval_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_date: Option<NaiveDate>,
}

fn default_donation_interval() -> u32 {
    DEFAULT_DONATION_INTERVAL_DAYS
}

impl Donor {
    /// Register an active donor who has never donated.
    pub fn new(name: impl Into<String>, city: impl Into<String>, blood_type: BloodType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            city: city.into(),
            blood_type,
            status: DonorStatus::Active,
            last_donation_date: None,
            donation_interval_days: DEFAULT_DONATION_INTERVAL_DAYS,
            next_eligible_date: None,
        }
    }

    /// Active, and the cooldown since the last donation has elapsed.
    pub fn is_eligible_on(&self, date: NaiveDate) -> bool {
        self.status == DonorStatus::Active
            && self.next_eligible_date.is_none_or(|next| next <= date)
    }

    /// Record a donation made on `date` and restart the cooldown.
    pub fn record_donation(&mut self, date: NaiveDate) {
        self.last_donation_date = Some(date);
        self.next_eligible_date = Some(add_days(date, self.donation_interval_days));
    }

    /// Fairness order: donors who have waited longest come first.
    ///
    /// Never-donated donors sort before everyone; ties break on id.
    pub fn waiting_order(a: &Donor, b: &Donor) -> Ordering {
        match (a.last_donation_date, b.last_donation_date) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (x, y) => x.cmp(&y),
        }
        .then_with(|| a.id.cmp(&b.id))
    }
}

/// A patient who receives transfusions on a recurring cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub id: String,
    pub name: String,
    pub city: String,
    pub blood_type: BloodType,
    #[serde(default = "default_required_units")]
    pub required_units: u32,
    #[serde(default = "default_transfusion_interval")]
    pub transfusion_interval_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transfusion_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<NaiveDate>,
}

fn default_required_units() -> u32 {
    1
}

fn default_transfusion_interval() -> u32 {
    DEFAULT_TRANSFUSION_INTERVAL_DAYS
}

impl Receiver {
    pub fn new(
        name: impl Into<String>,
        city: impl Into<String>,
        blood_type: BloodType,
        required_units: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            city: city.into(),
            blood_type,
            required_units,
            transfusion_interval_days: DEFAULT_TRANSFUSION_INTERVAL_DAYS,
            last_transfusion_date: None,
            next_due_date: None,
        }
    }

    /// Due on or before `horizon`.
    pub fn is_due_by(&self, horizon: NaiveDate) -> bool {
        self.next_due_date.is_some_and(|due| due <= horizon)
    }

    pub fn reschedule(&mut self, date: NaiveDate) {
        self.next_due_date = Some(date);
    }

    /// Close out a fully served transfusion and book the next one.
    pub fn complete_transfusion(&mut self, date: NaiveDate) {
        self.last_transfusion_date = Some(date);
        self.next_due_date = Some(add_days(date, self.transfusion_interval_days));
    }

    /// Processing order within a city: earliest due date, then id.
    pub fn due_order(a: &Receiver, b: &Receiver) -> Ordering {
        a.next_due_date
            .cmp(&b.next_due_date)
            .then_with(|| a.id.cmp(&b.id))
    }
}
