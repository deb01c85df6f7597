//! Caller-owned conversation state.
//!
//! The caller creates one [`Session`] per conversation and passes it to
//! every [`IntakeDesk::respond`](crate::IntakeDesk::respond) call. History
//! is bounded; the oldest turns are evicted first. Dropping the session
//! ends the conversation.

use chrono::NaiveDate;
use hemobank_core::BloodType;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Default history cap: ten exchanges.
pub const DEFAULT_MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// What the desk knows about the patient it is talking to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub city: Option<String>,
    pub blood_type: Option<BloodType>,
    /// Units needed for an urgent request; one when unset.
    pub required_units: Option<u32>,
    pub receiver_id: Option<String>,
    /// Date asked for when rescheduling.
    pub requested_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub profile: PatientProfile,
    history: VecDeque<Turn>,
    max_history: usize,
}

impl Session {
    pub fn new(profile: PatientProfile) -> Self {
        Self::with_max_history(profile, DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(profile: PatientProfile, max_history: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            profile,
            history: VecDeque::new(),
            max_history: max_history.max(2),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> + Clone {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Append one user message and the reply to it, then evict the oldest
    /// turns beyond the cap.
    pub fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history.push_back(Turn::new(TurnRole::User, message));
        self.history.push_back(Turn::new(TurnRole::Model, reply));
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
