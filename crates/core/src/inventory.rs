//! Stock Ledger: dated stock lots per city and blood type.
//!
//! A [`CityInventory`] holds, for each blood type, the live lots ordered by
//! collection date (oldest first). The ledger keeps two invariants on every
//! mutation:
//!
//! - lots within a bucket are sorted by `collected_on` ascending, with lots of
//!   equal date kept in insertion order
//! - no live lot has zero units
//!
//! Consumption is two-phase: a caller computes a list of [`Draw`]s against an
//! immutable view of a bucket, then hands it to [`CityInventory::apply_draws`],
//! which decrements and compacts in one step.

use crate::blood::BloodType;
use crate::error::InventoryError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dated batch of blood units of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    pub collected_on: NaiveDate,
    pub units: u32,
}

/// One planned decrement: take `units` from the lot at `index` of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub index: usize,
    pub units: u32,
}

/// Whether units added by donor backfill are offered to the same request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillPolicy {
    /// Re-run the allocation once against the freshly donated lots.
    #[default]
    Immediate,
    /// Leave donated lots in the ledger for the next cycle.
    Deferred,
}

/// The blood inventory of one city. The city name is the unique key.
///
/// `version` is the store's write counter for the row this copy was read
/// from. [`Store::commit`](crate::Store::commit) only accepts a batch whose
/// inventory still carries the stored version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityInventory {
    pub city: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    lots: BTreeMap<BloodType, Vec<StockLot>>,
}

impl CityInventory {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            version: 0,
            lots: BTreeMap::new(),
        }
    }

    /// Add a lot, keeping the bucket ordered by collection date.
    ///
    /// Backdated donations land before newer lots; a lot dated the same day
    /// as existing ones goes after them.
    pub fn add_lot(
        &mut self,
        blood_type: BloodType,
        units: u32,
        collected_on: NaiveDate,
    ) -> Result<(), InventoryError> {
        if units == 0 {
            return Err(InventoryError::InvalidQuantity(units));
        }
        let bucket = self.lots.entry(blood_type).or_default();
        let at = bucket.partition_point(|lot| lot.collected_on <= collected_on);
        bucket.insert(at, StockLot { collected_on, units });
        Ok(())
    }

    /// Live lots of a blood type, oldest first.
    ///
    /// The returned iterator is `Clone`, so it can be restarted.
    pub fn lots(
        &self,
        blood_type: BloodType,
    ) -> impl Iterator<Item = &StockLot> + Clone + '_ {
        self.bucket(blood_type).iter().filter(|lot| lot.units > 0)
    }

    /// The raw bucket for a blood type, for planning draws against.
    pub fn bucket(&self, blood_type: BloodType) -> &[StockLot] {
        self.lots.get(&blood_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of units across the live lots of a blood type.
    pub fn total_units(&self, blood_type: BloodType) -> u32 {
        self.lots(blood_type).map(|lot| lot.units).sum()
    }

    /// Totals for every blood type that has stock.
    pub fn totals(&self) -> Vec<(BloodType, u32)> {
        BloodType::ALL
            .into_iter()
            .map(|bt| (bt, self.total_units(bt)))
            .filter(|(_, units)| *units > 0)
            .collect()
    }

    /// Apply planned draws to a bucket, then purge emptied lots.
    ///
    /// Each draw is clamped to the units its lot holds, and draws pointing
    /// past the end of the bucket are ignored. Returns the units actually
    /// removed.
    pub fn apply_draws(&mut self, blood_type: BloodType, draws: &[Draw]) -> u32 {
        let Some(bucket) = self.lots.get_mut(&blood_type) else {
            return 0;
        };

        let mut removed = 0;
        for draw in draws {
            if let Some(lot) = bucket.get_mut(draw.index) {
                let take = draw.units.min(lot.units);
                lot.units -= take;
                removed += take;
            }
        }

        bucket.retain(|lot| lot.units > 0);
        if bucket.is_empty() {
            self.lots.remove(&blood_type);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.lots.values().all(|bucket| bucket.is_empty())
    }
}
