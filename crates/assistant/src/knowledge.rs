//! Keyword knowledge base used as retrieval context for classification.
//!
//! Topics are checked in a fixed order and the first topic with a keyword
//! contained in the message wins. Matching is case-insensitive substring
//! containment.

use serde::Serialize;
use std::fmt;

/// Returned when no topic matches.
pub const NO_CONTEXT: &str = "No specific context found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Emergency,
    Normal,
    Faq,
    EmotionalSupport,
    MedicalAttention,
}

impl Topic {
    /// Lookup order.
    pub const ALL: [Topic; 5] = [
        Topic::Emergency,
        Topic::Normal,
        Topic::Faq,
        Topic::EmotionalSupport,
        Topic::MedicalAttention,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Topic::Emergency => "emergency",
            Topic::Normal => "normal",
            Topic::Faq => "faq",
            Topic::EmotionalSupport => "emotional_support",
            Topic::MedicalAttention => "medical_attention",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Topic::Emergency => &["need blood", "urgent", "asap", "emergency", "today", "now", "immediately"],
            Topic::Normal => &["schedule", "appointment", "next transfusion", "set a date", "update my date", "book"],
            Topic::Faq => &["what is", "how to", "information", "thalassemia", "donate blood", "can i", "symptoms of"],
            Topic::EmotionalSupport => &["sad", "scared", "worried", "depressed", "feeling down", "anxious", "coping"],
            Topic::MedicalAttention => &[
                "fever",
                "pain",
                "dizzy",
                "fainting",
                "shortness of breath",
                "chest pain",
                "severe weakness",
                "unusual symptoms",
            ],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Topic::Emergency => {
                "This category is for users who require a blood transfusion urgently, typically within the next 24-48 hours, but are not expressing other severe medical symptoms."
            }
            Topic::Normal => {
                "This category is for routine scheduling of a future blood transfusion. The user is not in immediate distress."
            }
            Topic::Faq => {
                "This category covers general questions about thalassemia, blood donation procedures, eligibility, or the chatbot's functions."
            }
            Topic::EmotionalSupport => {
                "This category is for users expressing emotional distress, sadness, or anxiety related to their condition. They need empathetic support, not medical or logistical help."
            }
            Topic::MedicalAttention => {
                "This is the highest priority category. It's for users describing alarming medical symptoms beyond the standard need for blood. This includes high fever, severe pain, dizziness, etc. This category overrides the 'Emergency' category if symptoms are mentioned alongside a blood request."
            }
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeBase;

impl KnowledgeBase {
    pub fn new() -> Self {
        Self
    }

    /// First topic whose keywords appear in `message`.
    pub fn topic_for(&self, message: &str) -> Option<Topic> {
        let message = message.to_lowercase();
        Topic::ALL
            .into_iter()
            .find(|topic| topic.keywords().iter().any(|k| message.contains(k)))
    }

    /// Context line for the classification prompt.
    pub fn retrieve(&self, message: &str) -> String {
        match self.topic_for(message) {
            Some(topic) => format!(
                "The user's message seems related to the '{}' category. Description: {}",
                topic.key(),
                topic.description()
            ),
            None => NO_CONTEXT.to_string(),
        }
    }
}
