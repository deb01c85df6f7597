//! LLM provider clients for HemoBank.
//!
//! All providers implement the `hemobank_core::Provider` trait.
//! The router picks the one the classifier is configured for.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
