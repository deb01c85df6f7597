//! End-to-end tests for HemoBank.
//!
//! These exercise the full path from donation intake through the daily
//! assignment cycle to patient intake, against real stores and a scripted
//! LLM provider.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hemobank_allocation::{CityLocks, DonationDesk};
use hemobank_assistant::{IntakeDesk, Intent, IntentClassifier, PatientProfile, Session};
use hemobank_core::error::{InventoryError, ProviderError};
use hemobank_core::{
    AllotmentStatus, BloodType, Donation, DonationSchedule, DomainEvent, Donor, Error, EventBus,
    Message, Provider, ProviderRequest, ProviderResponse, Receiver, Store,
};
use hemobank_store::{InMemoryStore, SqliteStore};
use hemobank_workflow::{AssignmentScheduler, SchedulerSettings};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted replies in sequence and keeps every prompt it was sent.
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 503,
                message: "script exhausted".into(),
            })?;
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: None,
            model: request.model,
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2027, 1, d).unwrap()
}

struct Bank {
    store: Arc<dyn Store>,
    locks: Arc<CityLocks>,
    events: Arc<EventBus>,
}

impl Bank {
    fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Arc::new(CityLocks::new()),
            events: Arc::new(EventBus::default()),
        }
    }

    fn donations(&self) -> DonationDesk {
        DonationDesk::new(self.store.clone(), self.locks.clone(), self.events.clone())
    }

    fn scheduler(&self) -> AssignmentScheduler {
        AssignmentScheduler::new(
            self.store.clone(),
            self.locks.clone(),
            self.events.clone(),
            SchedulerSettings::default(),
        )
    }

    fn intake(&self, provider: Arc<ScriptedProvider>) -> IntakeDesk {
        IntakeDesk::new(
            IntentClassifier::new(provider, "test-model"),
            self.store.clone(),
            self.locks.clone(),
            self.events.clone(),
        )
    }

    async fn donate(&self, city: &str, blood_type: BloodType, units: u32, on: NaiveDate) {
        let donation = Donation::new("walk-in", city, blood_type, units, on);
        self.donations().record(&donation).await.unwrap();
    }

    async fn receiver(&self, name: &str, city: &str, blood_type: BloodType, units: u32, due: NaiveDate) -> Receiver {
        let mut receiver = Receiver::new(name, city, blood_type, units);
        receiver.reschedule(due);
        self.store.save_receiver(&receiver).await.unwrap();
        receiver
    }

    async fn donor(&self, name: &str, city: &str, blood_type: BloodType, last: Option<NaiveDate>) -> Donor {
        let mut donor = Donor::new(name, city, blood_type);
        if let Some(last) = last {
            donor.record_donation(last);
        }
        self.store.save_donor(&donor).await.unwrap();
        donor
    }

    async fn stock(&self, city: &str, blood_type: BloodType) -> Vec<(NaiveDate, u32)> {
        self.store
            .inventory(city)
            .await
            .unwrap()
            .map(|inv| inv.lots(blood_type).map(|l| (l.collected_on, l.units)).collect())
            .unwrap_or_default()
    }
}

// ── E2E: Daily assignment cycle ──────────────────────────────────────────

#[tokio::test]
async fn e2e_cycle_serves_due_receivers_oldest_stock_first() {
    let bank = Bank::in_memory();
    bank.donate("Pune", BloodType::OPos, 2, day(1)).await;
    bank.donate("Pune", BloodType::OPos, 2, day(3)).await;
    let first = bank.receiver("Meera", "Pune", BloodType::OPos, 3, day(10)).await;
    let second = bank.receiver("Ravi", "Pune", BloodType::OPos, 2, day(11)).await;

    let report = bank.scheduler().run_cycle(day(10)).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.units_allotted(), 4);
    assert_eq!(report.deficit(), 1);
    assert!(bank.stock("Pune", BloodType::OPos).await.is_empty());

    let served = bank.store.receiver(&first.id).await.unwrap().unwrap();
    assert_eq!(served.last_transfusion_date, Some(day(10)));
    assert_eq!(served.next_due_date, Some(day(31)));
    let allotments = bank.store.allotments_for(&first.id).await.unwrap();
    assert_eq!(allotments[0].status, AllotmentStatus::Completed);

    let waiting = bank.store.receiver(&second.id).await.unwrap().unwrap();
    assert_eq!(waiting.next_due_date, Some(day(11)));
    let partial = bank.store.allotments_for(&second.id).await.unwrap();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].units_allotted, 1);
    assert_eq!(partial[0].status, AllotmentStatus::Pending);
}

#[tokio::test]
async fn e2e_rerunning_a_day_only_chases_the_unmet_remainder() {
    let bank = Bank::in_memory();
    bank.donate("Pune", BloodType::OPos, 3, day(1)).await;
    let full = bank.receiver("Meera", "Pune", BloodType::OPos, 2, day(9)).await;
    let short = bank.receiver("Ravi", "Pune", BloodType::OPos, 2, day(10)).await;

    bank.scheduler().run_cycle(day(10)).await.unwrap();
    bank.donate("Pune", BloodType::OPos, 5, day(10)).await;
    let rerun = bank.scheduler().run_cycle(day(10)).await.unwrap();

    assert_eq!(rerun.units_allotted(), 1);
    assert_eq!(bank.store.allotments_for(&full.id).await.unwrap().len(), 1);
    let short_allotments = bank.store.allotments_for(&short.id).await.unwrap();
    let total: u32 = short_allotments.iter().map(|a| a.units_allotted).sum();
    assert_eq!(total, 2);
    assert_eq!(bank.stock("Pune", BloodType::OPos).await, vec![(day(10), 4)]);
}

#[tokio::test]
async fn e2e_shortfall_calls_in_longest_waiting_donors() {
    let bank = Bank::in_memory();
    bank.donate("Agra", BloodType::APos, 1, day(1)).await;
    let veteran = bank
        .donor("Kiran", "Agra", BloodType::ONeg, Some(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()))
        .await;
    let newcomer = bank.donor("Asha", "Agra", BloodType::ONeg, None).await;
    let recent = bank.donor("Dev", "Agra", BloodType::ONeg, Some(day(2))).await;
    let receiver = bank.receiver("Meera", "Agra", BloodType::ONeg, 2, day(10)).await;
    let mut events = bank.events.subscribe();

    let report = bank.scheduler().run_cycle(day(10)).await.unwrap();

    let outcome = &report.cities[0].receivers[0];
    assert_eq!(outcome.allotted, 2);
    assert_eq!(outcome.deficit, 0);
    assert_eq!(outcome.engaged_donors, vec![newcomer.id.clone(), veteran.id.clone()]);

    for id in [&newcomer.id, &veteran.id] {
        let donor = bank.store.donor(id).await.unwrap().unwrap();
        assert_eq!(donor.last_donation_date, Some(day(10)));
    }
    let untouched = bank.store.donor(&recent.id).await.unwrap().unwrap();
    assert_eq!(untouched.last_donation_date, Some(day(2)));

    let served = bank.store.receiver(&receiver.id).await.unwrap().unwrap();
    assert_eq!(served.next_due_date, Some(day(31)));

    let mut engaged = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event.as_ref(), DomainEvent::DonorEngaged { .. }) {
            engaged += 1;
        }
    }
    assert_eq!(engaged, 2);
}

#[tokio::test]
async fn e2e_city_without_blood_bank_is_skipped_not_fatal() {
    let bank = Bank::in_memory();
    bank.donate("Pune", BloodType::BPos, 1, day(1)).await;
    bank.receiver("Meera", "Pune", BloodType::BPos, 1, day(10)).await;
    bank.receiver("Lost", "Nagpur", BloodType::BPos, 1, day(10)).await;

    let report = bank.scheduler().run_cycle(day(10)).await.unwrap();

    assert_eq!(report.cities.len(), 1);
    assert_eq!(report.cities[0].city, "Pune");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].city, "Nagpur");
    assert!(report.failed.is_empty());
}

// ── E2E: Donation appointments ──────────────────────────────────────────

#[tokio::test]
async fn e2e_approved_appointment_stocks_the_next_cycle() {
    let bank = Bank::in_memory();
    let donor = bank.donor("Asha", "Pune", BloodType::AbNeg, None).await;
    let schedule = DonationSchedule::new(&donor.id, day(8), "City Hospital");
    bank.store.save_schedule(&schedule).await.unwrap();
    let receiver = bank.receiver("Meera", "Pune", BloodType::AbNeg, 1, day(10)).await;

    let approval = bank.donations().approve(&schedule.id).await.unwrap();
    assert_eq!(approval.donation.units, 1);
    assert_eq!(approval.donor.last_donation_date, Some(day(8)));
    assert!(bank.store.pending_schedules().await.unwrap().is_empty());

    let again = bank.donations().approve(&schedule.id).await;
    assert!(matches!(
        again,
        Err(Error::Inventory(InventoryError::ScheduleAlreadyCompleted(_)))
    ));

    let report = bank.scheduler().run_cycle(day(10)).await.unwrap();
    assert_eq!(report.units_allotted(), 1);
    let served = bank.store.receiver(&receiver.id).await.unwrap().unwrap();
    assert_eq!(served.last_transfusion_date, Some(day(10)));
}

// ── E2E: Patient intake ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_session_routes_each_message_and_keeps_history() {
    let bank = Bank::in_memory();
    bank.donate("Pune", BloodType::OPos, 2, day(1)).await;
    let provider = Arc::new(ScriptedProvider::new(&["1", "3", "not sure"]));
    let desk = bank.intake(provider.clone());
    let mut session = Session::new(PatientProfile {
        city: Some("Pune".into()),
        blood_type: Some(BloodType::OPos),
        required_units: Some(3),
        ..PatientProfile::default()
    });

    let urgent = desk.respond(&mut session, "I need blood urgently", day(10)).await.unwrap();
    assert_eq!(urgent.intent, Intent::UrgentBloodLogistics);
    let shortfall = urgent.shortfall.unwrap();
    assert_eq!((shortfall.satisfied, shortfall.deficit), (2, 1));
    assert!(urgent.message.contains("customer care"));

    let info = desk.respond(&mut session, "what is thalassemia?", day(10)).await.unwrap();
    assert_eq!(info.intent, Intent::GeneralInformation);

    let unknown = desk.respond(&mut session, "hmm", day(10)).await.unwrap();
    assert_eq!(unknown.intent, Intent::Unknown);
    assert!(unknown.message.contains("human agent"));

    assert_eq!(session.history_len(), 6);
    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("user: I need blood urgently"));
    assert!(prompts[2].contains("user: what is thalassemia?"));
    assert!(bank.stock("Pune", BloodType::OPos).await.is_empty());
}

#[tokio::test]
async fn e2e_provider_outage_hands_off_to_a_human() {
    let bank = Bank::in_memory();
    let provider = Arc::new(ScriptedProvider::new(&[]));
    let desk = bank.intake(provider);
    let mut session = Session::new(PatientProfile::default());

    let reply = desk.respond(&mut session, "help me", day(10)).await.unwrap();

    assert_eq!(reply.intent, Intent::Unknown);
    assert!(reply.message.contains("human agent"));
}

#[tokio::test]
async fn e2e_routine_request_feeds_the_scheduler() {
    let bank = Bank::in_memory();
    bank.donate("Pune", BloodType::BNeg, 2, day(1)).await;
    let receiver = bank.receiver("Meera", "Pune", BloodType::BNeg, 2, day(25)).await;
    let desk = bank.intake(Arc::new(ScriptedProvider::new(&["2"])));
    let mut session = Session::new(PatientProfile {
        receiver_id: Some(receiver.id.clone()),
        requested_date: Some(day(12)),
        ..PatientProfile::default()
    });

    let reply = desk.respond(&mut session, "can I come in earlier?", day(10)).await.unwrap();
    assert_eq!(reply.message, "Next transfusion date set to 2027-01-12");

    let before = bank.scheduler().run_cycle(day(10)).await.unwrap();
    assert_eq!(before.units_allotted(), 0);
    let on_the_day = bank.scheduler().run_cycle(day(12)).await.unwrap();
    assert_eq!(on_the_day.units_allotted(), 2);
}

// ── E2E: Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_cycle_results_survive_reopening_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("bank.db").display());

    let receiver_id = {
        let bank = Bank::with_store(Arc::new(SqliteStore::new(&url).await.unwrap()));
        bank.donate("Pune", BloodType::OPos, 3, day(1)).await;
        let receiver = bank.receiver("Meera", "Pune", BloodType::OPos, 2, day(10)).await;
        let report = bank.scheduler().run_cycle(day(10)).await.unwrap();
        assert_eq!(report.units_allotted(), 2);
        receiver.id
    };

    let bank = Bank::with_store(Arc::new(SqliteStore::new(&url).await.unwrap()));
    assert_eq!(bank.stock("Pune", BloodType::OPos).await, vec![(day(1), 1)]);
    let receiver = bank.store.receiver(&receiver_id).await.unwrap().unwrap();
    assert_eq!(receiver.next_due_date, Some(day(31)));
    let allotments = bank.store.allotments_for(&receiver_id).await.unwrap();
    assert_eq!(allotments.len(), 1);
    assert_eq!(allotments[0].status, AllotmentStatus::Completed);

    let rerun = bank.scheduler().run_cycle(day(10)).await.unwrap();
    assert_eq!(rerun.units_allotted(), 0);
}

#[tokio::test]
async fn e2e_partial_transfusion_is_finished_next_day_not_repeated() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("bank.db").display());
    let bank = Bank::with_store(Arc::new(SqliteStore::new(&url).await.unwrap()));
    bank.donate("Pune", BloodType::OPos, 1, day(1)).await;
    let receiver = bank.receiver("Meera", "Pune", BloodType::OPos, 3, day(10)).await;

    let first = bank.scheduler().run_cycle(day(10)).await.unwrap();
    assert_eq!(first.units_allotted(), 1);

    bank.donate("Pune", BloodType::OPos, 10, day(10)).await;
    let second = bank.scheduler().run_cycle(day(11)).await.unwrap();
    assert_eq!(second.units_allotted(), 2);

    let allotments = bank.store.allotments_for(&receiver.id).await.unwrap();
    let total: u32 = allotments.iter().map(|a| a.units_allotted).sum();
    assert_eq!(total, 3);
    assert!(allotments.iter().all(|a| a.status == AllotmentStatus::Completed));
    assert_eq!(bank.stock("Pune", BloodType::OPos).await, vec![(day(10), 8)]);

    let served = bank.store.receiver(&receiver.id).await.unwrap().unwrap();
    assert_eq!(served.next_due_date, Some(day(11) + chrono::Days::new(21)));
    let third = bank.scheduler().run_cycle(day(12)).await.unwrap();
    assert_eq!(third.units_allotted(), 0);
}
