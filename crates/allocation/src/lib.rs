//! Allocation core for HemoBank.
//!
//! - [`engine`]: oldest-first consumption of stock lots
//! - [`shortfall`]: donor backfill when the ledger runs short
//! - [`fulfilment`]: one request end to end: engine, resolver, refill
//! - [`donations`]: donation intake and appointment approval
//! - [`locks`]: per-city critical sections

pub mod engine;
pub mod shortfall;
pub mod fulfilment;
pub mod donations;
pub mod locks;

pub use engine::{Allocation, AllocationEngine, AllocationPlan};
pub use shortfall::{Resolution, ShortfallResolver};
pub use fulfilment::{Fulfilment, fulfil};
pub use donations::{DonationDesk, ScheduleApproval};
pub use locks::CityLocks;
