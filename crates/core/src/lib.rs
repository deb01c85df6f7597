//! # HemoBank Core
//!
//! Domain types, traits, and error definitions for the HemoBank blood-bank
//! coordinator. This crate has **no storage or network dependencies**: it
//! defines the domain model that every other crate implements against.
//!
//! ## Layout
//!
//! - [`blood`]: the eight ABO/Rh blood types
//! - [`inventory`]: dated stock lots and the per-city Stock Ledger
//! - [`people`]: donors and receivers
//! - [`records`]: allotments, donations and donation schedules
//! - [`store`]: the persistence boundary
//! - [`provider`]: the LLM boundary used by the intake classifier
//! - [`event`]: domain events and the broadcast bus

pub mod error;
pub mod blood;
pub mod inventory;
pub mod people;
pub mod records;
pub mod message;
pub mod provider;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use blood::BloodType;
pub use inventory::{CityInventory, Draw, RefillPolicy, StockLot};
pub use people::{Donor, DonorStatus, Receiver};
pub use records::{Allotment, AllotmentStatus, Donation, DonationSchedule};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use store::{CityBatch, Store};
pub use event::{DomainEvent, EventBus};
