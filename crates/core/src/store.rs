//! Store trait: the persistence boundary.
//!
//! The allocation core only needs find-by-key, listing by city, and save.
//! A city's allocation results are written through [`Store::commit`] so that
//! readers never see a half-applied cycle.
//!
//! Implementations: in-memory (tests, ephemeral runs) and SQLite.

use async_trait::async_trait;
use chrono::NaiveDate;
use crate::error::StoreError;
use crate::inventory::CityInventory;
use crate::people::{Donor, Receiver};
use crate::records::{Allotment, DonationSchedule};

/// Everything one city's allocation pass changed.
#[derive(Debug, Clone)]
pub struct CityBatch {
    pub inventory: CityInventory,
    pub donors: Vec<Donor>,
    pub receivers: Vec<Receiver>,
    pub allotments: Vec<Allotment>,
    pub schedules: Vec<DonationSchedule>,
}

impl CityBatch {
    pub fn new(inventory: CityInventory) -> Self {
        Self {
            inventory,
            donors: Vec::new(),
            receivers: Vec::new(),
            allotments: Vec::new(),
            schedules: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Inventory ---

    /// Every city that has an inventory, sorted.
    async fn cities(&self) -> Result<Vec<String>, StoreError>;

    async fn inventory(&self, city: &str) -> Result<Option<CityInventory>, StoreError>;

    /// Unconditional write, keeping `inventory.version` as given. Allocation
    /// paths go through [`Store::commit`].
    async fn save_inventory(&self, inventory: &CityInventory) -> Result<(), StoreError>;

    // --- Donors ---

    async fn donor(&self, id: &str) -> Result<Option<Donor>, StoreError>;

    async fn donors_in(&self, city: &str) -> Result<Vec<Donor>, StoreError>;

    async fn save_donor(&self, donor: &Donor) -> Result<(), StoreError>;

    // --- Receivers ---

    async fn receiver(&self, id: &str) -> Result<Option<Receiver>, StoreError>;

    /// Every city with at least one registered receiver, sorted.
    async fn receiver_cities(&self) -> Result<Vec<String>, StoreError>;

    /// Receivers of a city whose next due date is on or before `horizon`.
    async fn receivers_due(&self, city: &str, horizon: NaiveDate) -> Result<Vec<Receiver>, StoreError>;

    async fn save_receiver(&self, receiver: &Receiver) -> Result<(), StoreError>;

    // --- Allotments ---

    async fn allotments_for(&self, receiver_id: &str) -> Result<Vec<Allotment>, StoreError>;

    async fn save_allotment(&self, allotment: &Allotment) -> Result<(), StoreError>;

    // --- Donation schedules ---

    async fn schedule(&self, id: &str) -> Result<Option<DonationSchedule>, StoreError>;

    /// Schedules not yet completed, earliest first.
    async fn pending_schedules(&self) -> Result<Vec<DonationSchedule>, StoreError>;

    async fn save_schedule(&self, schedule: &DonationSchedule) -> Result<(), StoreError>;

    // --- Atomic write ---

    /// Persist a city's batch as one unit: all of it or none of it.
    ///
    /// The stored inventory must still be at `batch.inventory.version`
    /// (0 for a city not stored yet), otherwise nothing is written and
    /// [`StoreError::Conflict`] is returned. A successful commit bumps the
    /// stored version by one.
    async fn commit(&self, batch: CityBatch) -> Result<(), StoreError>;
}
