//! Error types for the HemoBank domain.
//!
//! Each area (ledger, persistence, LLM provider) has its own enum, folded
//! into [`Error`] with `#[from]`.

use thiserror::Error;

/// The top-level error type for all HemoBank operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inventory / allocation errors ---
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    // --- Persistence errors ---
    #[error("Persistence failure: {0}")]
    Store(#[from] StoreError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Classification ---
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

}

pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Invalid quantity: {0} units (must be positive)")]
    InvalidQuantity(u32),

    #[error("No blood bank inventory for city: {0}")]
    CityNotFound(String),

    #[error("Receiver not found: {0}")]
    ReceiverNotFound(String),

    #[error("Donor not found: {0}")]
    DonorNotFound(String),

    #[error("Donation schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("Donation schedule already completed: {0}")]
    ScheduleAlreadyCompleted(String),

    #[error("Allotment not found: {0}")]
    AllotmentNotFound(String),

    #[error("Allotment already settled: {0}")]
    AllotmentSettled(String),

    #[error("Unknown blood type: {0}")]
    UnknownBloodType(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Inventory of {city} changed since it was read (expected version {expected})")]
    Conflict { city: String, expected: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}
