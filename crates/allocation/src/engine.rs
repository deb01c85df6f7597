//! Allocation Engine: greedy, oldest-first consumption.
//!
//! A request is served in two phases. [`AllocationPlan::compute`] walks an
//! immutable view of a bucket and decides how many units to take from each
//! lot. [`AllocationEngine::allocate`] then hands the plan to the ledger,
//! which decrements and compacts in one step.
//!
//! When the bucket holds less than requested, everything available is
//! consumed and the remainder is reported as a deficit for the caller to
//! resolve. Summed over a pass, decrements equal
//! `min(requested, total units at start)`.

use chrono::NaiveDate;
use hemobank_core::{BloodType, CityInventory, Draw, StockLot};
use serde::Serialize;
use tracing::info;

/// Units taken from one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LotDraw {
    pub collected_on: NaiveDate,
    pub units: u32,
}

/// How a request would be served from a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub requested: u32,
    draws: Vec<Draw>,
    lots: Vec<LotDraw>,
}

impl AllocationPlan {
    /// Plan a greedy FIFO pass over `bucket` (already oldest first).
    pub fn compute(bucket: &[StockLot], requested: u32) -> Self {
        let mut need = requested;
        let mut draws = Vec::new();
        let mut lots = Vec::new();

        for (index, lot) in bucket.iter().enumerate() {
            if need == 0 {
                break;
            }
            let take = lot.units.min(need);
            if take == 0 {
                continue;
            }
            need -= take;
            draws.push(Draw { index, units: take });
            lots.push(LotDraw {
                collected_on: lot.collected_on,
                units: take,
            });
        }

        Self {
            requested,
            draws,
            lots,
        }
    }

    pub fn planned_units(&self) -> u32 {
        self.draws.iter().map(|d| d.units).sum()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub blood_type: BloodType,
    pub requested: u32,
    pub satisfied: u32,
    pub deficit: u32,
    /// Lots drawn from, oldest first.
    pub consumed: Vec<LotDraw>,
}

impl Allocation {
    pub fn is_complete(&self) -> bool {
        self.deficit == 0
    }
}

pub struct AllocationEngine;

impl AllocationEngine {
    /// Serve `requested` units of `blood_type` from the city's ledger.
    ///
    /// `requested == 0` leaves the ledger untouched.
    pub fn allocate(
        inventory: &mut CityInventory,
        blood_type: BloodType,
        requested: u32,
    ) -> Allocation {
        if requested == 0 {
            return Allocation {
                blood_type,
                requested,
                satisfied: 0,
                deficit: 0,
                consumed: Vec::new(),
            };
        }

        let plan = AllocationPlan::compute(inventory.bucket(blood_type), requested);
        let satisfied = inventory.apply_draws(blood_type, plan.draws());

        info!(
            city = %inventory.city,
            blood_type = %blood_type,
            requested,
            satisfied,
            lots = plan.lots.len(),
            "Allocation pass applied"
        );

        Allocation {
            blood_type,
            requested,
            satisfied,
            deficit: requested - satisfied,
            consumed: plan.lots,
        }
    }
}
