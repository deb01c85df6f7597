//! Domain events published after state is committed.
//!
//! Subscribers see an event only once the change it describes is durable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::blood::BloodType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A donation entered a city's inventory
    DonationRecorded {
        city: String,
        blood_type: BloodType,
        units: u32,
        timestamp: DateTime<Utc>,
    },

    /// Units were allotted to a request
    AllocationCompleted {
        city: String,
        receiver_id: Option<String>,
        blood_type: BloodType,
        requested: u32,
        satisfied: u32,
        timestamp: DateTime<Utc>,
    },

    /// A request could not be met in full
    ShortfallReported {
        city: String,
        blood_type: BloodType,
        deficit: u32,
        timestamp: DateTime<Utc>,
    },

    /// A donor was called in to cover a shortfall
    DonorEngaged {
        donor_id: String,
        city: String,
        blood_type: BloodType,
        timestamp: DateTime<Utc>,
    },

    /// A city was skipped by the assignment cycle
    CitySkipped {
        city: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// An assignment cycle finished
    CycleCompleted {
        as_of: NaiveDate,
        cities_processed: usize,
        cities_failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The intake assistant classified a message
    MessageClassified {
        session_id: String,
        category: String,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of [`DomainEvent`]s. Slow subscribers lag and drop old events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
