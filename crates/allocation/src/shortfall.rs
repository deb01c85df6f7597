//! Shortfall Resolver: call in eligible donors to cover a deficit.
//!
//! Each engaged donor gives one unit, recorded as a lot dated the
//! resolution day. Selection is deterministic: eligible donors of the
//! right city and blood type, longest-waiting first.

use chrono::NaiveDate;
use hemobank_core::{BloodType, CityInventory, Donor};
use serde::Serialize;
use tracing::info;

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub deficit: u32,
    /// Ids of the donors called in, in selection order.
    pub engaged: Vec<String>,
    /// Deficit left after every eligible donor was used.
    pub unresolved: u32,
}

impl Resolution {
    pub fn units_added(&self) -> u32 {
        self.engaged.len() as u32
    }
}

pub struct ShortfallResolver;

impl ShortfallResolver {
    /// Indices into `donors` of up to `limit` eligible donors, in fairness
    /// order.
    pub fn select(
        donors: &[Donor],
        city: &str,
        blood_type: BloodType,
        as_of: NaiveDate,
        limit: usize,
    ) -> Vec<usize> {
        let mut eligible: Vec<usize> = donors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.city == city && d.blood_type == blood_type && d.is_eligible_on(as_of))
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by(|&a, &b| Donor::waiting_order(&donors[a], &donors[b]));
        eligible.truncate(limit);
        eligible
    }

    /// Engage up to `deficit` donors, mark their donation, and add one lot
    /// per donor to the ledger.
    ///
    /// `donors` is updated in place; the caller persists the changed ones
    /// (see [`Resolution::engaged`]).
    pub fn resolve(
        inventory: &mut CityInventory,
        donors: &mut [Donor],
        blood_type: BloodType,
        deficit: u32,
        as_of: NaiveDate,
    ) -> Resolution {
        let picked = Self::select(donors, &inventory.city, blood_type, as_of, deficit as usize);

        let mut engaged = Vec::with_capacity(picked.len());
        for index in picked {
            let donor = &mut donors[index];
            // One unit is always a valid quantity.
            if inventory.add_lot(blood_type, 1, as_of).is_err() {
                continue;
            }
            donor.record_donation(as_of);
            info!(
                donor_id = %donor.id,
                donor = %donor.name,
                city = %inventory.city,
                blood_type = %blood_type,
                next_eligible = ?donor.next_eligible_date,
                "Donor engaged for shortfall"
            );
            engaged.push(donor.id.clone());
        }

        let unresolved = deficit - engaged.len() as u32;
        Resolution {
            deficit,
            engaged,
            unresolved,
        }
    }
}
