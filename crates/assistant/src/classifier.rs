//! Intent Classifier: knowledge-base context, prompt, model call, digit.
//!
//! The model call is bounded by a timeout. Any failure degrades to
//! [`Intent::Unknown`], which the desk answers with a human handoff.

use hemobank_config::ClassifierConfig;
use hemobank_core::{Error, Provider, ProviderRequest, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::intent::Intent;
use crate::knowledge::KnowledgeBase;
use crate::prompt::classification_prompt;
use crate::session::Turn;

/// A classified message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    /// Knowledge-base context that went into the prompt.
    pub context: String,
    /// Raw model output; `None` when the call failed.
    pub raw: Option<String>,
}

pub struct IntentClassifier {
    provider: Arc<dyn Provider>,
    knowledge: KnowledgeBase,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            knowledge: KnowledgeBase::new(),
            model: model.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ClassifierConfig) -> Self {
        Self::new(provider, &config.model)
            .with_temperature(config.temperature)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Classify `message` given the prior turns. Never fails.
    pub async fn classify<'a>(
        &self,
        message: &str,
        history: impl IntoIterator<Item = &'a Turn>,
    ) -> Classification {
        let context = self.knowledge.retrieve(message);
        let prompt = classification_prompt(&context, history, message);

        match self.call(prompt).await {
            Ok(raw) => {
                let intent = Intent::parse(&raw);
                debug!(provider = self.provider.name(), %intent, raw = %raw.trim(), "Message classified");
                Classification {
                    intent,
                    context,
                    raw: Some(raw),
                }
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Classification failed, handing off");
                Classification {
                    intent: Intent::Unknown,
                    context,
                    raw: None,
                }
            }
        }
    }

    async fn call(&self, prompt: String) -> Result<String> {
        let request = ProviderRequest::prompt(&self.model, prompt, self.temperature);
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                Error::ClassificationUnavailable(format!("no answer within {:?}", self.timeout))
            })?
            .map_err(|e| Error::ClassificationUnavailable(e.to_string()))?;
        Ok(response.message.content)
    }
}
