pub mod assign;
pub mod chat;
pub mod daemon;
pub mod inventory;
pub mod onboard;
pub mod registry;
pub mod schedule;
pub mod status;

use std::sync::Arc;

use hemobank_allocation::{CityLocks, DonationDesk};
use hemobank_config::{AppConfig, StoreBackend};
use hemobank_core::{EventBus, Store};
use hemobank_store::{InMemoryStore, SqliteStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Shared handles every command works against.
pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub locks: Arc<CityLocks>,
    pub events: Arc<EventBus>,
}

impl Runtime {
    pub async fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let store = open_store(&config).await?;
        Ok(Self {
            config,
            store,
            locks: Arc::new(CityLocks::new()),
            events: Arc::new(EventBus::default()),
        })
    }

    pub fn donation_desk(&self) -> DonationDesk {
        DonationDesk::new(self.store.clone(), self.locks.clone(), self.events.clone())
    }
}

pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Sqlite => {
            if let Some(dir) = config.store.path.parent()
                && !dir.as_os_str().is_empty()
            {
                std::fs::create_dir_all(dir)?;
            }
            let url = format!("sqlite://{}", config.store.path.display());
            let store = SqliteStore::new(&url)
                .await
                .map_err(|e| format!("Failed to open store: {e}"))?;
            Ok(Arc::new(store))
        }
    }
}

/// Today's calendar date in UTC.
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
