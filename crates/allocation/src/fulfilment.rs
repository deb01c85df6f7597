//! One request served end to end: ledger first, donors second.

use chrono::NaiveDate;
use hemobank_core::{BloodType, CityInventory, Donor, RefillPolicy};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{Allocation, AllocationEngine};
use crate::shortfall::{Resolution, ShortfallResolver};

/// Result of serving one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fulfilment {
    pub blood_type: BloodType,
    pub requested: u32,
    /// The pass against existing stock.
    pub allocation: Allocation,
    /// Donor backfill, when the first pass fell short.
    pub resolution: Option<Resolution>,
    /// The second pass against backfilled stock (immediate refill only).
    pub refill: Option<Allocation>,
}

impl Fulfilment {
    pub fn satisfied(&self) -> u32 {
        self.allocation.satisfied + self.refill.as_ref().map_or(0, |r| r.satisfied)
    }

    pub fn deficit(&self) -> u32 {
        self.requested - self.satisfied()
    }

    pub fn is_complete(&self) -> bool {
        self.deficit() == 0
    }

    pub fn engaged_donors(&self) -> &[String] {
        match &self.resolution {
            Some(resolution) => &resolution.engaged,
            None => &[],
        }
    }
}

/// Serve `requested` units of `blood_type` from `inventory`, calling in
/// donors from `donors` on a shortfall.
pub fn fulfil(
    inventory: &mut CityInventory,
    donors: &mut [Donor],
    blood_type: BloodType,
    requested: u32,
    as_of: NaiveDate,
    policy: RefillPolicy,
) -> Fulfilment {
    let allocation = AllocationEngine::allocate(inventory, blood_type, requested);

    if allocation.is_complete() {
        return Fulfilment {
            blood_type,
            requested,
            allocation,
            resolution: None,
            refill: None,
        };
    }

    warn!(
        city = %inventory.city,
        blood_type = %blood_type,
        requested,
        satisfied = allocation.satisfied,
        deficit = allocation.deficit,
        "Ledger short, resolving with donors"
    );

    let resolution = ShortfallResolver::resolve(inventory, donors, blood_type, allocation.deficit, as_of);

    let refill = match policy {
        RefillPolicy::Immediate if !resolution.engaged.is_empty() => Some(AllocationEngine::allocate(
            inventory,
            blood_type,
            allocation.deficit,
        )),
        _ => None,
    };

    let fulfilment = Fulfilment {
        blood_type,
        requested,
        allocation,
        resolution: Some(resolution),
        refill,
    };

    if fulfilment.is_complete() {
        info!(city = %inventory.city, blood_type = %blood_type, requested, "Shortfall covered by donors");
    } else {
        warn!(
            city = %inventory.city,
            blood_type = %blood_type,
            requested,
            deficit = fulfilment.deficit(),
            "Shortfall unresolved"
        );
    }

    fulfilment
}
