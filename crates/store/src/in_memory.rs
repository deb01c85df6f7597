//! In-memory store: useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use hemobank_core::error::StoreError;
use hemobank_core::{
    Allotment, CityBatch, CityInventory, DonationSchedule, Donor, Receiver, Store,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    inventories: BTreeMap<String, CityInventory>,
    donors: HashMap<String, Donor>,
    receivers: HashMap<String, Receiver>,
    allotments: Vec<Allotment>,
    schedules: HashMap<String, DonationSchedule>,
}

impl Tables {
    fn put_allotment(&mut self, allotment: &Allotment) {
        match self.allotments.iter_mut().find(|a| a.id == allotment.id) {
            Some(existing) => *existing = allotment.clone(),
            None => self.allotments.push(allotment.clone()),
        }
    }
}

/// Every table behind one lock, so a [`CityBatch`] lands in a single write.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn cities(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.read().await.inventories.keys().cloned().collect())
    }

    async fn inventory(&self, city: &str) -> Result<Option<CityInventory>, StoreError> {
        Ok(self.tables.read().await.inventories.get(city).cloned())
    }

    async fn save_inventory(&self, inventory: &CityInventory) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .inventories
            .insert(inventory.city.clone(), inventory.clone());
        Ok(())
    }

    async fn donor(&self, id: &str) -> Result<Option<Donor>, StoreError> {
        Ok(self.tables.read().await.donors.get(id).cloned())
    }

    async fn donors_in(&self, city: &str) -> Result<Vec<Donor>, StoreError> {
        let tables = self.tables.read().await;
        let mut donors: Vec<Donor> = tables
            .donors
            .values()
            .filter(|d| d.city == city)
            .cloned()
            .collect();
        donors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(donors)
    }

    async fn save_donor(&self, donor: &Donor) -> Result<(), StoreError> {
        self.tables.write().await.donors.insert(donor.id.clone(), donor.clone());
        Ok(())
    }

    async fn receiver(&self, id: &str) -> Result<Option<Receiver>, StoreError> {
        Ok(self.tables.read().await.receivers.get(id).cloned())
    }

    async fn receiver_cities(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let mut cities: Vec<String> = tables.receivers.values().map(|r| r.city.clone()).collect();
        cities.sort();
        cities.dedup();
        Ok(cities)
    }

    async fn receivers_due(&self, city: &str, horizon: NaiveDate) -> Result<Vec<Receiver>, StoreError> {
        let tables = self.tables.read().await;
        let mut due: Vec<Receiver> = tables
            .receivers
            .values()
            .filter(|r| r.city == city && r.is_due_by(horizon))
            .cloned()
            .collect();
        due.sort_by(Receiver::due_order);
        Ok(due)
    }

    async fn save_receiver(&self, receiver: &Receiver) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .receivers
            .insert(receiver.id.clone(), receiver.clone());
        Ok(())
    }

    async fn allotments_for(&self, receiver_id: &str) -> Result<Vec<Allotment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .allotments
            .iter()
            .filter(|a| a.receiver_id == receiver_id)
            .cloned()
            .collect())
    }

    async fn save_allotment(&self, allotment: &Allotment) -> Result<(), StoreError> {
        self.tables.write().await.put_allotment(allotment);
        Ok(())
    }

    async fn schedule(&self, id: &str) -> Result<Option<DonationSchedule>, StoreError> {
        Ok(self.tables.read().await.schedules.get(id).cloned())
    }

    async fn pending_schedules(&self) -> Result<Vec<DonationSchedule>, StoreError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<DonationSchedule> = tables
            .schedules
            .values()
            .filter(|s| !s.completed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.scheduled_on.cmp(&b.scheduled_on).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn save_schedule(&self, schedule: &DonationSchedule) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .schedules
            .insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn commit(&self, batch: CityBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let city = &batch.inventory.city;
        let stored = tables.inventories.get(city).map_or(0, |inv| inv.version);
        if stored != batch.inventory.version {
            return Err(StoreError::Conflict {
                city: city.clone(),
                expected: batch.inventory.version,
            });
        }

        for donor in batch.donors {
            tables.donors.insert(donor.id.clone(), donor);
        }
        for receiver in batch.receivers {
            tables.receivers.insert(receiver.id.clone(), receiver);
        }
        for allotment in &batch.allotments {
            tables.put_allotment(allotment);
        }
        for schedule in batch.schedules {
            tables.schedules.insert(schedule.id.clone(), schedule);
        }
        let mut inventory = batch.inventory;
        inventory.version += 1;
        tables.inventories.insert(inventory.city.clone(), inventory);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemobank_core::{AllotmentStatus, BloodType, Draw};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
    }

    #[tokio::test]
    async fn cities_are_sorted() {
        let store = InMemoryStore::new();
        store.save_inventory(&CityInventory::new("Pune")).await.unwrap();
        store.save_inventory(&CityInventory::new("Agra")).await.unwrap();
        assert_eq!(store.cities().await.unwrap(), vec!["Agra", "Pune"]);
    }

    #[tokio::test]
    async fn receivers_due_filters_and_orders() {
        let store = InMemoryStore::new();
        let mut late = Receiver::new("late", "Pune", BloodType::OPos, 1);
        late.reschedule(day(5));
        let mut early = Receiver::new("early", "Pune", BloodType::OPos, 1);
        early.reschedule(day(2));
        let mut future = Receiver::new("future", "Pune", BloodType::OPos, 1);
        future.reschedule(day(20));
        let mut elsewhere = Receiver::new("elsewhere", "Agra", BloodType::OPos, 1);
        elsewhere.reschedule(day(1));
        for r in [&late, &early, &future, &elsewhere] {
            store.save_receiver(r).await.unwrap();
        }

        let due = store.receivers_due("Pune", day(10)).await.unwrap();
        let names: Vec<_> = due.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn saving_an_allotment_twice_updates_it() {
        let store = InMemoryStore::new();
        let mut a = Allotment::new("r1", "Pune", BloodType::OPos, 2, day(1), AllotmentStatus::Pending);
        store.save_allotment(&a).await.unwrap();
        a.settle(AllotmentStatus::Completed);
        store.save_allotment(&a).await.unwrap();

        let stored = store.allotments_for("r1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, AllotmentStatus::Completed);
    }

    #[tokio::test]
    async fn commit_writes_the_whole_batch() {
        let store = InMemoryStore::new();
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 3, day(1)).unwrap();
        let donor = Donor::new("Asha", "Pune", BloodType::OPos);
        let receiver = Receiver::new("Meera", "Pune", BloodType::OPos, 1);
        let allotment = Allotment::new(&receiver.id, "Pune", BloodType::OPos, 1, day(1), AllotmentStatus::Completed);
        let mut schedule = DonationSchedule::new(&donor.id, day(1), "Camp");
        schedule.completed = true;

        let mut batch = CityBatch::new(inv.clone());
        batch.donors.push(donor.clone());
        batch.receivers.push(receiver.clone());
        batch.allotments.push(allotment.clone());
        batch.schedules.push(schedule.clone());
        store.commit(batch).await.unwrap();

        inv.version = 1;
        assert_eq!(store.inventory("Pune").await.unwrap(), Some(inv));
        assert_eq!(store.donor(&donor.id).await.unwrap(), Some(donor));
        assert_eq!(store.receiver(&receiver.id).await.unwrap(), Some(receiver.clone()));
        assert_eq!(store.allotments_for(&receiver.id).await.unwrap(), vec![allotment]);
        assert_eq!(store.schedule(&schedule.id).await.unwrap(), Some(schedule));
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_whole() {
        let store = InMemoryStore::new();
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 3, day(1)).unwrap();
        store.save_inventory(&inv).await.unwrap();

        let mut first = store.inventory("Pune").await.unwrap().unwrap();
        let mut second = store.inventory("Pune").await.unwrap().unwrap();
        first.apply_draws(BloodType::OPos, &[Draw { index: 0, units: 2 }]);
        second.apply_draws(BloodType::OPos, &[Draw { index: 0, units: 3 }]);

        store.commit(CityBatch::new(first)).await.unwrap();
        let mut late = CityBatch::new(second);
        late.allotments
            .push(Allotment::new("r1", "Pune", BloodType::OPos, 3, day(1), AllotmentStatus::Completed));
        let err = store.commit(late).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { expected: 0, .. }));
        let stored = store.inventory("Pune").await.unwrap().unwrap();
        assert_eq!(stored.total_units(BloodType::OPos), 1);
        assert_eq!(stored.version, 1);
        assert!(store.allotments_for("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_schedules_skip_completed() {
        let store = InMemoryStore::new();
        let later = DonationSchedule::new("d1", day(9), "Camp");
        let sooner = DonationSchedule::new("d2", day(3), "Camp");
        let mut done = DonationSchedule::new("d3", day(1), "Camp");
        done.completed = true;
        for s in [&later, &sooner, &done] {
            store.save_schedule(s).await.unwrap();
        }

        let pending = store.pending_schedules().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
    }
}
