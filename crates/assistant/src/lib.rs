//! Patient intake assistant for HemoBank.
//!
//! A message flows through four steps:
//!
//! 1. [`knowledge`] finds the topic the message mentions (RAG context)
//! 2. [`prompt`] renders the classification prompt with history
//! 3. [`classifier`] asks the model for a category and parses the digit
//! 4. [`desk`] runs the handler for that [`Intent`] and updates the [`Session`]

pub mod knowledge;
pub mod prompt;
pub mod intent;
pub mod session;
pub mod classifier;
pub mod desk;

pub use knowledge::{KnowledgeBase, Topic};
pub use intent::Intent;
pub use session::{PatientProfile, Session, Turn, TurnRole};
pub use classifier::{Classification, IntentClassifier};
pub use desk::{IntakeDesk, Reply, Shortfall};
