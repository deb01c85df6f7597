//! SQLite store.
//!
//! One table per aggregate. Each row keeps the record as a JSON `body`
//! plus the columns the store filters or orders on:
//! - `inventories`: keyed by city, with the `version` the batch commit
//!   compares and bumps
//! - `donors`: indexed by city
//! - `receivers`: indexed by (city, next_due_date)
//! - `allotments`: indexed by receiver
//! - `schedules`: indexed by (completed, scheduled_on)
//!
//! Dates are stored as ISO `YYYY-MM-DD` text, which orders correctly.

use async_trait::async_trait;
use chrono::NaiveDate;
use hemobank_core::error::StoreError;
use hemobank_core::{
    Allotment, CityBatch, CityInventory, DonationSchedule, Donor, Receiver, Store,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` gives an ephemeral database on a single connection.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "inventories table",
                "CREATE TABLE IF NOT EXISTS inventories (
                    city    TEXT PRIMARY KEY NOT NULL,
                    version INTEGER NOT NULL DEFAULT 0,
                    body    TEXT NOT NULL
                )",
            ),
            (
                "donors table",
                "CREATE TABLE IF NOT EXISTS donors (
                    id   TEXT PRIMARY KEY NOT NULL,
                    city TEXT NOT NULL,
                    body TEXT NOT NULL
                )",
            ),
            (
                "receivers table",
                "CREATE TABLE IF NOT EXISTS receivers (
                    id            TEXT PRIMARY KEY NOT NULL,
                    city          TEXT NOT NULL,
                    next_due_date TEXT,
                    body          TEXT NOT NULL
                )",
            ),
            (
                "allotments table",
                "CREATE TABLE IF NOT EXISTS allotments (
                    id          TEXT PRIMARY KEY NOT NULL,
                    receiver_id TEXT NOT NULL,
                    created_at  TEXT NOT NULL,
                    body        TEXT NOT NULL
                )",
            ),
            (
                "schedules table",
                "CREATE TABLE IF NOT EXISTS schedules (
                    id           TEXT PRIMARY KEY NOT NULL,
                    completed    INTEGER NOT NULL DEFAULT 0,
                    scheduled_on TEXT NOT NULL,
                    body         TEXT NOT NULL
                )",
            ),
            ("donors index", "CREATE INDEX IF NOT EXISTS idx_donors_city ON donors(city)"),
            (
                "receivers index",
                "CREATE INDEX IF NOT EXISTS idx_receivers_due ON receivers(city, next_due_date)",
            ),
            (
                "allotments index",
                "CREATE INDEX IF NOT EXISTS idx_allotments_receiver ON allotments(receiver_id)",
            ),
            (
                "schedules index",
                "CREATE INDEX IF NOT EXISTS idx_schedules_pending ON schedules(completed, scheduled_on)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        // Databases created before inventories were versioned.
        let has_version: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('inventories') WHERE name = 'version'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("inventories columns: {e}")))?;
        if has_version == 0 {
            sqlx::query("ALTER TABLE inventories ADD COLUMN version INTEGER NOT NULL DEFAULT 0")
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("inventories version: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| StoreError::Storage(format!("Connection: {e}")))
    }

    async fn fetch_one_body<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("{sql}: {e}")))?;
        row.as_ref().map(|r| decode(r, key)).transpose()
    }
}

fn encode<T: Serialize>(value: &T, key: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(row: &SqliteRow, key: &str) -> Result<T, StoreError> {
    let body: String = row
        .try_get("body")
        .map_err(|e| StoreError::QueryFailed(format!("body column: {e}")))?;
    serde_json::from_str(&body).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_all<T: DeserializeOwned>(rows: &[SqliteRow], what: &str) -> Result<Vec<T>, StoreError> {
    rows.iter().map(|row| decode(row, what)).collect()
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn write_failed(table: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Storage(format!("{table} upsert failed: {e}"))
}

fn version_column(version: u64, city: &str) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt {
        key: city.to_string(),
        reason: format!("version {version} out of range"),
    })
}

async fn upsert_inventory(conn: &mut SqliteConnection, inventory: &CityInventory) -> Result<(), StoreError> {
    let body = encode(inventory, &inventory.city)?;
    sqlx::query(
        "INSERT INTO inventories (city, version, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(city) DO UPDATE SET version = excluded.version, body = excluded.body",
    )
    .bind(&inventory.city)
    .bind(version_column(inventory.version, &inventory.city)?)
    .bind(&body)
    .execute(conn)
    .await
    .map_err(write_failed("inventories"))?;
    Ok(())
}

/// Write `inventory` as the successor of the row at `inventory.version`.
async fn advance_inventory(conn: &mut SqliteConnection, inventory: &CityInventory) -> Result<(), StoreError> {
    let city = &inventory.city;
    let expected = inventory.version;
    let mut next = inventory.clone();
    next.version = expected + 1;
    let body = encode(&next, city)?;

    let updated = sqlx::query("UPDATE inventories SET version = ?2, body = ?3 WHERE city = ?1 AND version = ?4")
        .bind(city)
        .bind(version_column(next.version, city)?)
        .bind(&body)
        .bind(version_column(expected, city)?)
        .execute(&mut *conn)
        .await
        .map_err(write_failed("inventories"))?
        .rows_affected();
    if updated == 1 {
        return Ok(());
    }

    let inserted = if expected == 0 {
        sqlx::query("INSERT INTO inventories (city, version, body) VALUES (?1, 1, ?2) ON CONFLICT(city) DO NOTHING")
            .bind(city)
            .bind(&body)
            .execute(&mut *conn)
            .await
            .map_err(write_failed("inventories"))?
            .rows_affected()
    } else {
        0
    };
    if inserted == 1 {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            city: city.clone(),
            expected,
        })
    }
}

async fn upsert_schedule(conn: &mut SqliteConnection, schedule: &DonationSchedule) -> Result<(), StoreError> {
    let body = encode(schedule, &schedule.id)?;
    sqlx::query(
        "INSERT INTO schedules (id, completed, scheduled_on, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             completed = excluded.completed,
             scheduled_on = excluded.scheduled_on,
             body = excluded.body",
    )
    .bind(&schedule.id)
    .bind(schedule.completed)
    .bind(iso(schedule.scheduled_on))
    .bind(&body)
    .execute(conn)
    .await
    .map_err(write_failed("schedules"))?;
    Ok(())
}

async fn upsert_donor(conn: &mut SqliteConnection, donor: &Donor) -> Result<(), StoreError> {
    let body = encode(donor, &donor.id)?;
    sqlx::query(
        "INSERT INTO donors (id, city, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET city = excluded.city, body = excluded.body",
    )
    .bind(&donor.id)
    .bind(&donor.city)
    .bind(&body)
    .execute(conn)
    .await
    .map_err(write_failed("donors"))?;
    Ok(())
}

async fn upsert_receiver(conn: &mut SqliteConnection, receiver: &Receiver) -> Result<(), StoreError> {
    let body = encode(receiver, &receiver.id)?;
    sqlx::query(
        "INSERT INTO receivers (id, city, next_due_date, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             city = excluded.city,
             next_due_date = excluded.next_due_date,
             body = excluded.body",
    )
    .bind(&receiver.id)
    .bind(&receiver.city)
    .bind(receiver.next_due_date.map(iso))
    .bind(&body)
    .execute(conn)
    .await
    .map_err(write_failed("receivers"))?;
    Ok(())
}

async fn upsert_allotment(conn: &mut SqliteConnection, allotment: &Allotment) -> Result<(), StoreError> {
    let body = encode(allotment, &allotment.id)?;
    sqlx::query(
        "INSERT INTO allotments (id, receiver_id, created_at, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body",
    )
    .bind(&allotment.id)
    .bind(&allotment.receiver_id)
    .bind(allotment.created_at.to_rfc3339())
    .bind(&body)
    .execute(conn)
    .await
    .map_err(write_failed("allotments"))?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn cities(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT city FROM inventories ORDER BY city")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("cities: {e}")))?;
        rows.iter()
            .map(|row| {
                row.try_get("city")
                    .map_err(|e| StoreError::QueryFailed(format!("city column: {e}")))
            })
            .collect()
    }

    async fn inventory(&self, city: &str) -> Result<Option<CityInventory>, StoreError> {
        self.fetch_one_body("SELECT body FROM inventories WHERE city = ?1", city).await
    }

    async fn save_inventory(&self, inventory: &CityInventory) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        upsert_inventory(&mut conn, inventory).await
    }

    async fn donor(&self, id: &str) -> Result<Option<Donor>, StoreError> {
        self.fetch_one_body("SELECT body FROM donors WHERE id = ?1", id).await
    }

    async fn donors_in(&self, city: &str) -> Result<Vec<Donor>, StoreError> {
        let rows = sqlx::query("SELECT body FROM donors WHERE city = ?1 ORDER BY id")
            .bind(city)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("donors_in: {e}")))?;
        decode_all(&rows, "donors")
    }

    async fn save_donor(&self, donor: &Donor) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        upsert_donor(&mut conn, donor).await
    }

    async fn receiver(&self, id: &str) -> Result<Option<Receiver>, StoreError> {
        self.fetch_one_body("SELECT body FROM receivers WHERE id = ?1", id).await
    }

    async fn receiver_cities(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT city FROM receivers ORDER BY city")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("receiver_cities: {e}")))?;
        rows.iter()
            .map(|row| {
                row.try_get("city")
                    .map_err(|e| StoreError::QueryFailed(format!("city column: {e}")))
            })
            .collect()
    }

    async fn receivers_due(&self, city: &str, horizon: NaiveDate) -> Result<Vec<Receiver>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM receivers
             WHERE city = ?1 AND next_due_date IS NOT NULL AND next_due_date <= ?2
             ORDER BY next_due_date, id",
        )
        .bind(city)
        .bind(iso(horizon))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("receivers_due: {e}")))?;
        decode_all(&rows, "receivers")
    }

    async fn save_receiver(&self, receiver: &Receiver) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        upsert_receiver(&mut conn, receiver).await
    }

    async fn allotments_for(&self, receiver_id: &str) -> Result<Vec<Allotment>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM allotments WHERE receiver_id = ?1 ORDER BY created_at, id",
        )
        .bind(receiver_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("allotments_for: {e}")))?;
        decode_all(&rows, "allotments")
    }

    async fn save_allotment(&self, allotment: &Allotment) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        upsert_allotment(&mut conn, allotment).await
    }

    async fn schedule(&self, id: &str) -> Result<Option<DonationSchedule>, StoreError> {
        self.fetch_one_body("SELECT body FROM schedules WHERE id = ?1", id).await
    }

    async fn pending_schedules(&self) -> Result<Vec<DonationSchedule>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM schedules WHERE completed = 0 ORDER BY scheduled_on, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("pending_schedules: {e}")))?;
        decode_all(&rows, "schedules")
    }

    async fn save_schedule(&self, schedule: &DonationSchedule) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        upsert_schedule(&mut conn, schedule).await
    }

    async fn commit(&self, batch: CityBatch) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        advance_inventory(&mut tx, &batch.inventory).await?;
        for donor in &batch.donors {
            upsert_donor(&mut tx, donor).await?;
        }
        for receiver in &batch.receivers {
            upsert_receiver(&mut tx, receiver).await?;
        }
        for allotment in &batch.allotments {
            upsert_allotment(&mut tx, allotment).await?;
        }
        for schedule in &batch.schedules {
            upsert_schedule(&mut tx, schedule).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(
            city = %batch.inventory.city,
            donors = batch.donors.len(),
            receivers = batch.receivers.len(),
            allotments = batch.allotments.len(),
            schedules = batch.schedules.len(),
            version = batch.inventory.version + 1,
            "City batch committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemobank_core::{AllotmentStatus, BloodType, Draw};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    async fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hemobank.db");
        let store = SqliteStore::new(&format!("sqlite://{}", path.display())).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn backend_name() {
        let (store, _dir) = test_store().await;
        assert_eq!(store.name(), "sqlite");
    }

    #[tokio::test]
    async fn inventory_lots_survive_a_round_trip() {
        let (store, _dir) = test_store().await;
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::AbPos, 2, day(2)).unwrap();
        inv.add_lot(BloodType::AbPos, 1, day(1)).unwrap();
        store.save_inventory(&inv).await.unwrap();

        let loaded = store.inventory("Pune").await.unwrap().unwrap();
        assert_eq!(loaded, inv);
        assert!(store.inventory("Agra").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receivers_due_uses_date_order() {
        let (store, _dir) = test_store().await;
        let mut a = Receiver::new("a", "Pune", BloodType::OPos, 1);
        a.reschedule(day(9));
        let mut b = Receiver::new("b", "Pune", BloodType::OPos, 1);
        b.reschedule(day(3));
        let unscheduled = Receiver::new("c", "Pune", BloodType::OPos, 1);
        let mut later = Receiver::new("d", "Pune", BloodType::OPos, 1);
        later.reschedule(day(25));
        for r in [&a, &b, &unscheduled, &later] {
            store.save_receiver(r).await.unwrap();
        }

        let due = store.receivers_due("Pune", day(10)).await.unwrap();
        let names: Vec<_> = due.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn commit_is_visible_as_a_whole() {
        let (store, _dir) = test_store().await;
        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::BNeg, 4, day(1)).unwrap();
        let mut donor = Donor::new("Asha", "Pune", BloodType::BNeg);
        donor.record_donation(day(1));
        let mut receiver = Receiver::new("Meera", "Pune", BloodType::BNeg, 2);
        receiver.complete_transfusion(day(1));
        let allotment = Allotment::new(&receiver.id, "Pune", BloodType::BNeg, 2, day(1), AllotmentStatus::Completed);

        let mut batch = CityBatch::new(inv.clone());
        batch.donors.push(donor.clone());
        batch.receivers.push(receiver.clone());
        batch.allotments.push(allotment.clone());
        store.commit(batch).await.unwrap();

        let mut inv = inv;
        inv.version = 1;
        assert_eq!(store.cities().await.unwrap(), vec!["Pune"]);
        assert_eq!(store.inventory("Pune").await.unwrap(), Some(inv));
        assert_eq!(store.donors_in("Pune").await.unwrap(), vec![donor]);
        assert_eq!(store.receiver(&receiver.id).await.unwrap(), Some(receiver.clone()));
        assert_eq!(store.allotments_for(&receiver.id).await.unwrap(), vec![allotment]);
    }

    #[tokio::test]
    async fn stale_commit_from_another_handle_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("hemobank.db").display());
        let chat = SqliteStore::new(&url).await.unwrap();
        let daemon = SqliteStore::new(&url).await.unwrap();

        let mut inv = CityInventory::new("Pune");
        inv.add_lot(BloodType::OPos, 3, day(1)).unwrap();
        chat.commit(CityBatch::new(inv)).await.unwrap();

        let mut seen_by_chat = chat.inventory("Pune").await.unwrap().unwrap();
        let mut seen_by_daemon = daemon.inventory("Pune").await.unwrap().unwrap();
        seen_by_daemon.apply_draws(BloodType::OPos, &[Draw { index: 0, units: 2 }]);
        daemon.commit(CityBatch::new(seen_by_daemon)).await.unwrap();

        seen_by_chat.apply_draws(BloodType::OPos, &[Draw { index: 0, units: 3 }]);
        let mut late = CityBatch::new(seen_by_chat);
        late.allotments
            .push(Allotment::new("r1", "Pune", BloodType::OPos, 3, day(2), AllotmentStatus::Completed));
        let err = chat.commit(late).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { expected: 1, .. }));
        let stored = chat.inventory("Pune").await.unwrap().unwrap();
        assert_eq!(stored.total_units(BloodType::OPos), 1);
        assert_eq!(stored.version, 2);
        assert!(chat.allotments_for("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_commit_of_a_city_with_stale_version_conflicts() {
        let (store, _dir) = test_store().await;
        let mut inv = CityInventory::new("Agra");
        inv.version = 4;
        let err = store.commit(CityBatch::new(inv)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 4, .. }));
        assert!(store.cities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schedule_completion_removes_it_from_pending() {
        let (store, _dir) = test_store().await;
        let mut s = DonationSchedule::new("d1", day(4), "Camp");
        store.save_schedule(&s).await.unwrap();
        assert_eq!(store.pending_schedules().await.unwrap().len(), 1);

        s.completed = true;
        store.save_schedule(&s).await.unwrap();
        assert!(store.pending_schedules().await.unwrap().is_empty());
        assert_eq!(store.schedule(&s.id).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn corrupt_body_is_reported() {
        let (store, _dir) = test_store().await;
        sqlx::query("INSERT INTO donors (id, city, body) VALUES ('bad', 'Pune', 'not json')")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.donor("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("hemobank.db").display());
        let donor = Donor::new("Ravi", "Agra", BloodType::ONeg);
        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.save_donor(&donor).await.unwrap();
        }
        let store = SqliteStore::new(&url).await.unwrap();
        assert_eq!(store.donor(&donor.id).await.unwrap(), Some(donor));
    }
}
