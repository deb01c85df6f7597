//! Intake desk: classify a patient message and run its handler.
//!
//! Urgent requests go through the same fulfilment path as the daily cycle,
//! under the same city lock. Routine requests move the receiver's next due
//! date. The remaining categories get fixed replies. Missing patient
//! details are answered with a question, never an error.

use chrono::{NaiveDate, Utc};
use hemobank_allocation::{CityLocks, fulfil};
use hemobank_core::{
    Allotment, AllotmentStatus, BloodType, CityBatch, DomainEvent, EventBus, RefillPolicy, Result,
    Store,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::IntentClassifier;
use crate::intent::Intent;
use crate::session::Session;

pub const NO_BLOOD_BANK: &str = "No blood bank found in your city.";
pub const INFORMATION_REPLY: &str =
    "This is an FAQ response. How can I help you with information about Thalassemia or blood donation?";
pub const SUPPORT_REPLY: &str = "It sounds like you're going through a tough time. Please know it's okay to feel this way. I am connecting you with a supportive community.";
pub const MEDICAL_REPLY: &str = "Your symptoms sound serious. Please contact your doctor or go to the nearest emergency room immediately. This is not something to wait on.";
pub const HANDOFF_REPLY: &str =
    "I'm having a little trouble understanding. I'm connecting you to a human agent for assistance.";
pub const ASK_CITY_AND_TYPE: &str =
    "To arrange blood I need your city and blood group. Could you share them?";
pub const ASK_RECEIVER_AND_DATE: &str =
    "To update your schedule I need your receiver ID and the date you'd like for your next transfusion.";

/// Units satisfied against units required for an urgent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub city: String,
    pub blood_type: BloodType,
    pub required: u32,
    pub satisfied: u32,
    pub deficit: u32,
    /// Donors called in to cover the gap.
    pub donors_contacted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub intent: Intent,
    pub message: String,
    /// Present for urgent requests that reached a blood bank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<Shortfall>,
}

impl Reply {
    fn text(intent: Intent, message: impl Into<String>) -> Self {
        Self {
            intent,
            message: message.into(),
            shortfall: None,
        }
    }
}

pub struct IntakeDesk {
    classifier: IntentClassifier,
    store: Arc<dyn Store>,
    locks: Arc<CityLocks>,
    events: Arc<EventBus>,
    refill: RefillPolicy,
    default_units: u32,
}

impl IntakeDesk {
    pub fn new(
        classifier: IntentClassifier,
        store: Arc<dyn Store>,
        locks: Arc<CityLocks>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            classifier,
            store,
            locks,
            events,
            refill: RefillPolicy::default(),
            default_units: 1,
        }
    }

    pub fn with_refill(mut self, refill: RefillPolicy) -> Self {
        self.refill = refill;
        self
    }

    /// Units requested when the profile does not say.
    pub fn with_default_units(mut self, units: u32) -> Self {
        self.default_units = units.max(1);
        self
    }

    /// Answer one patient message and append the exchange to the session.
    ///
    /// Only persistence failures surface as errors.
    pub async fn respond(&self, session: &mut Session, message: &str, as_of: NaiveDate) -> Result<Reply> {
        let classification = self.classifier.classify(message, session.history()).await;
        let intent = classification.intent;

        self.events.publish(DomainEvent::MessageClassified {
            session_id: session.id.clone(),
            category: intent.label().to_string(),
            timestamp: Utc::now(),
        });
        info!(session_id = %session.id, %intent, "Handling patient message");

        let reply = match intent {
            Intent::UrgentBloodLogistics => self.urgent(session, as_of).await?,
            Intent::RoutineScheduling => self.reschedule(session).await?,
            Intent::GeneralInformation => Reply::text(intent, INFORMATION_REPLY),
            Intent::EmotionalSupport => Reply::text(intent, SUPPORT_REPLY),
            Intent::MedicalAttention => Reply::text(intent, MEDICAL_REPLY),
            Intent::Unknown => Reply::text(intent, HANDOFF_REPLY),
        };

        session.record_exchange(message, &reply.message);
        Ok(reply)
    }

    async fn urgent(&self, session: &Session, as_of: NaiveDate) -> Result<Reply> {
        let intent = Intent::UrgentBloodLogistics;
        let profile = &session.profile;
        let (Some(city), Some(blood_type)) = (profile.city.as_deref(), profile.blood_type) else {
            return Ok(Reply::text(intent, ASK_CITY_AND_TYPE));
        };
        let required = profile.required_units.unwrap_or(self.default_units);

        let _guard = self.locks.lock(city).await;

        let Some(inventory) = self.store.inventory(city).await? else {
            warn!(city, "Urgent request for a city without a blood bank");
            return Ok(Reply::text(intent, NO_BLOOD_BANK));
        };
        let mut donors = self.store.donors_in(city).await?;
        let mut batch = CityBatch::new(inventory);

        let fulfilment = fulfil(&mut batch.inventory, &mut donors, blood_type, required, as_of, self.refill);
        let satisfied = fulfilment.satisfied();
        let deficit = fulfilment.deficit();
        let engaged = fulfilment.engaged_donors();

        batch.donors = donors.into_iter().filter(|d| engaged.contains(&d.id)).collect();
        if let Some(receiver_id) = &profile.receiver_id
            && satisfied > 0
        {
            if self.store.receiver(receiver_id).await?.is_some() {
                let status = if deficit == 0 {
                    AllotmentStatus::Completed
                } else {
                    AllotmentStatus::Pending
                };
                batch
                    .allotments
                    .push(Allotment::new(receiver_id, city, blood_type, satisfied, as_of, status));
            } else {
                warn!(receiver_id = %receiver_id, city, "Urgent allocation for unknown receiver, no allotment recorded");
            }
        }
        self.store.commit(batch).await?;

        let now = Utc::now();
        self.events.publish(DomainEvent::AllocationCompleted {
            city: city.to_string(),
            receiver_id: profile.receiver_id.clone(),
            blood_type,
            requested: required,
            satisfied,
            timestamp: now,
        });
        for donor_id in engaged {
            self.events.publish(DomainEvent::DonorEngaged {
                donor_id: donor_id.clone(),
                city: city.to_string(),
                blood_type,
                timestamp: now,
            });
        }

        let message = if deficit == 0 {
            format!("Emergency handled. {required} units of {blood_type} have been allocated from {city} blood bank.")
        } else {
            self.events.publish(DomainEvent::ShortfallReported {
                city: city.to_string(),
                blood_type,
                deficit,
                timestamp: now,
            });
            format!(
                "Sorry, only {satisfied} of {required} units of {blood_type} could be allocated in {city}. \
                 We have contacted {} donors who might have your blood. Please contact customer care for alternatives.",
                engaged.len()
            )
        };

        Ok(Reply {
            intent,
            message,
            shortfall: Some(Shortfall {
                city: city.to_string(),
                blood_type,
                required,
                satisfied,
                deficit,
                donors_contacted: engaged.len(),
            }),
        })
    }

    async fn reschedule(&self, session: &Session) -> Result<Reply> {
        let intent = Intent::RoutineScheduling;
        let profile = &session.profile;
        let (Some(receiver_id), Some(date)) = (profile.receiver_id.as_deref(), profile.requested_date) else {
            return Ok(Reply::text(intent, ASK_RECEIVER_AND_DATE));
        };

        let Some(mut receiver) = self.store.receiver(receiver_id).await? else {
            warn!(receiver_id, "Reschedule for unknown receiver");
            return Ok(Reply::text(
                intent,
                format!("I couldn't find receiver {receiver_id}. Please check your receiver ID."),
            ));
        };

        receiver.reschedule(date);
        self.store.save_receiver(&receiver).await?;
        info!(receiver_id, name = %receiver.name, %date, "Next transfusion rescheduled");

        Ok(Reply::text(intent, format!("Next transfusion date set to {date}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PatientProfile;
    use async_trait::async_trait;
    use hemobank_core::error::ProviderError;
    use hemobank_core::{CityInventory, Donor, Message, Provider, ProviderRequest, ProviderResponse, Receiver};
    use hemobank_store::InMemoryStore;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(self.0),
                usage: None,
                model: request.model,
            })
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, d).unwrap()
    }

    fn desk(reply: &'static str, store: Arc<InMemoryStore>) -> IntakeDesk {
        IntakeDesk::new(
            IntentClassifier::new(Arc::new(FixedProvider(reply)), "m"),
            store,
            Arc::new(CityLocks::new()),
            Arc::new(EventBus::default()),
        )
    }

    fn patient(city: &str, bt: BloodType, units: u32) -> Session {
        Session::new(PatientProfile {
            city: Some(city.into()),
            blood_type: Some(bt),
            required_units: Some(units),
            ..PatientProfile::default()
        })
    }

    #[tokio::test]
    async fn urgent_request_allocates_oldest_first() {
        let store = Arc::new(InMemoryStore::new());
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 2, day(1)).unwrap();
        inv.add_lot(BloodType::OPos, 2, day(2)).unwrap();
        store.save_inventory(&inv).await.unwrap();
        let desk = desk("1", store.clone());
        let mut session = patient("Pune", BloodType::OPos, 3);

        let reply = desk.respond(&mut session, "I need blood urgently", day(5)).await.unwrap();

        assert_eq!(reply.intent, Intent::UrgentBloodLogistics);
        let shortfall = reply.shortfall.unwrap();
        assert_eq!((shortfall.satisfied, shortfall.deficit), (3, 0));
        assert!(reply.message.starts_with("Emergency handled. 3 units of O+"));
        let left = store.inventory("Pune").await.unwrap().unwrap();
        let lots: Vec<_> = left.lots(BloodType::OPos).map(|l| (l.collected_on, l.units)).collect();
        assert_eq!(lots, vec![(day(2), 1)]);
    }

    #[tokio::test]
    async fn urgent_shortfall_is_reported_not_hidden() {
        let store = Arc::new(InMemoryStore::new());
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::BNeg, 1, day(1)).unwrap();
        store.save_inventory(&inv).await.unwrap();
        store.save_donor(&Donor::new("Asha", "Pune", BloodType::BNeg)).await.unwrap();
        let desk = desk("1", store.clone());
        let mut session = patient("Pune", BloodType::BNeg, 4);

        let reply = desk.respond(&mut session, "need blood asap", day(5)).await.unwrap();

        let shortfall = reply.shortfall.unwrap();
        assert_eq!(shortfall.satisfied, 2);
        assert_eq!(shortfall.deficit, 2);
        assert_eq!(shortfall.donors_contacted, 1);
        assert!(reply.message.starts_with("Sorry, only 2 of 4 units"));
        let donors = store.donors_in("Pune").await.unwrap();
        assert_eq!(donors[0].last_donation_date, Some(day(5)));
    }

    #[tokio::test]
    async fn urgent_request_in_unknown_city() {
        let desk = desk("1", Arc::new(InMemoryStore::new()));
        let mut session = patient("Atlantis", BloodType::APos, 1);

        let reply = desk.respond(&mut session, "emergency", day(5)).await.unwrap();

        assert_eq!(reply.message, NO_BLOOD_BANK);
        assert!(reply.shortfall.is_none());
    }

    #[tokio::test]
    async fn urgent_request_without_details_asks_for_them() {
        let desk = desk("1", Arc::new(InMemoryStore::new()));
        let mut session = Session::new(PatientProfile::default());

        let reply = desk.respond(&mut session, "need blood now", day(5)).await.unwrap();

        assert_eq!(reply.message, ASK_CITY_AND_TYPE);
    }

    #[tokio::test]
    async fn urgent_request_records_allotment_for_known_receiver() {
        let store = Arc::new(InMemoryStore::new());
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 5, day(1)).unwrap();
        store.save_inventory(&inv).await.unwrap();
        let mut receiver = Receiver::new("Meera", "Pune", BloodType::OPos, 2);
        receiver.id = "r1".into();
        store.save_receiver(&receiver).await.unwrap();
        let desk = desk("1", store.clone());
        let mut session = patient("Pune", BloodType::OPos, 2);
        session.profile.receiver_id = Some("r1".into());

        desk.respond(&mut session, "urgent", day(5)).await.unwrap();

        let allotments = store.allotments_for("r1").await.unwrap();
        assert_eq!(allotments.len(), 1);
        assert_eq!(allotments[0].units_allotted, 2);
        assert_eq!(allotments[0].status, AllotmentStatus::Completed);
    }

    #[tokio::test]
    async fn urgent_request_for_unknown_receiver_records_no_allotment() {
        let store = Arc::new(InMemoryStore::new());
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 5, day(1)).unwrap();
        store.save_inventory(&inv).await.unwrap();
        let desk = desk("1", store.clone());
        let mut session = patient("Pune", BloodType::OPos, 2);
        session.profile.receiver_id = Some("ghost".into());

        let reply = desk.respond(&mut session, "urgent", day(5)).await.unwrap();

        assert_eq!(reply.shortfall.unwrap().satisfied, 2);
        assert!(store.allotments_for("ghost").await.unwrap().is_empty());
        let left = store.inventory("Pune").await.unwrap().unwrap();
        assert_eq!(left.total_units(BloodType::OPos), 3);
    }

    #[tokio::test]
    async fn routine_request_reschedules_receiver() {
        let store = Arc::new(InMemoryStore::new());
        let receiver = Receiver::new("Meera", "Pune", BloodType::APos, 1);
        store.save_receiver(&receiver).await.unwrap();
        let desk = desk("2", store.clone());
        let mut session = Session::new(PatientProfile {
            receiver_id: Some(receiver.id.clone()),
            requested_date: Some(day(20)),
            ..PatientProfile::default()
        });

        let reply = desk.respond(&mut session, "please book my next transfusion", day(5)).await.unwrap();

        assert_eq!(reply.message, "Next transfusion date set to 2026-12-20");
        let stored = store.receiver(&receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.next_due_date, Some(day(20)));
    }

    #[tokio::test]
    async fn routine_request_for_missing_receiver_is_answered() {
        let desk = desk("2", Arc::new(InMemoryStore::new()));
        let mut session = Session::new(PatientProfile {
            receiver_id: Some("ghost".into()),
            requested_date: Some(day(20)),
            ..PatientProfile::default()
        });

        let reply = desk.respond(&mut session, "reschedule", day(5)).await.unwrap();

        assert!(reply.message.contains("couldn't find receiver ghost"));
    }

    #[tokio::test]
    async fn each_category_has_one_handler() {
        let cases = [
            ("3", Intent::GeneralInformation, INFORMATION_REPLY),
            ("4", Intent::EmotionalSupport, SUPPORT_REPLY),
            ("5", Intent::MedicalAttention, MEDICAL_REPLY),
            ("no idea", Intent::Unknown, HANDOFF_REPLY),
            ("9", Intent::Unknown, HANDOFF_REPLY),
        ];
        for (raw, intent, text) in cases {
            let desk = desk(raw, Arc::new(InMemoryStore::new()));
            let mut session = Session::new(PatientProfile::default());
            let reply = desk.respond(&mut session, "hello", day(5)).await.unwrap();
            assert_eq!(reply.intent, intent, "raw {raw}");
            assert_eq!(reply.message, text);
        }
    }

    #[tokio::test]
    async fn exchange_is_added_to_history() {
        let desk = desk("3", Arc::new(InMemoryStore::new()));
        let mut session = Session::new(PatientProfile::default());

        desk.respond(&mut session, "what is thalassemia?", day(5)).await.unwrap();

        let turns: Vec<_> = session.history().map(|t| t.text.clone()).collect();
        assert_eq!(turns, vec!["what is thalassemia?".to_string(), INFORMATION_REPLY.to_string()]);
    }
}
