//! Typed document store on top of a single SQLite table.
//!
//! Every entity lives in `documents` as a JSON body keyed by
//! `(collection, id)` with a version stamp. Reads decode strictly into the
//! entity type and fail closed on malformed bodies. Transactions track the
//! version of every document they read, so writing back a stale copy fails
//! with [`StoreError::Conflict`] instead of losing a concurrent update.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};

pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

pub trait Document: Serialize + DeserializeOwned + Send + Sync + Unpin {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document was modified by a concurrent writer")]
    Conflict,

    #[error("{collection} document {id} already exists")]
    AlreadyExists { collection: &'static str, id: String },

    #[error("malformed {collection} document {id}: {reason}")]
    Malformed {
        collection: &'static str,
        id: String,
        reason: String,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // SQLITE_BUSY / SQLITE_LOCKED and their extended codes
            let busy = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6));
            if busy {
                return StoreError::Conflict;
            }
        }
        StoreError::Database(e)
    }
}

type Row = (String, String, i64);

fn decode<T: Document>(id: &str, body: &str) -> Result<T, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        collection: T::COLLECTION,
        id: id.to_string(),
        reason,
    };
    let doc: T = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    if doc.id() != id {
        return Err(malformed(format!("body carries id {}", doc.id())));
    }
    Ok(doc)
}

fn field_path(field: &str) -> String {
    format!("$.{field}")
}

// The comparison value is bound as JSON text and unwrapped by SQLite, so
// strings, integers and booleans compare the same way json_extract reports
// them from the stored body.
fn encode_value(value: Value) -> String {
    value.to_string()
}

const SELECT_ONE: &str = "SELECT id, body, version FROM documents WHERE collection = ? AND id = ?";
const SELECT_BY_FIELD: &str = "SELECT id, body, version FROM documents \
     WHERE collection = ? AND json_extract(body, ?) = json_extract(?, '$') \
     ORDER BY rowid";
const SELECT_ALL: &str =
    "SELECT id, body, version FROM documents WHERE collection = ? ORDER BY rowid";
const INSERT: &str = "INSERT INTO documents (collection, id, body, version, updated_at) \
     VALUES (?, ?, ?, 1, ?)";
const UPSERT: &str = "INSERT INTO documents (collection, id, body, version, updated_at) \
     VALUES (?, ?, ?, 1, ?) \
     ON CONFLICT (collection, id) DO UPDATE SET \
     body = excluded.body, version = documents.version + 1, updated_at = excluded.updated_at";

fn insert_error<T: Document>(e: sqlx::Error, id: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists {
            collection: T::COLLECTION,
            id: id.to_string(),
        },
        _ => e.into(),
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    max_attempts: u32,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// How many times a transaction body is replayed after a conflict.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn get<T: Document>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let row: Option<Row> = sqlx::query_as(SELECT_ONE)
            .bind(T::COLLECTION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, body, _)| decode(&id, &body)).transpose()
    }

    /// All documents of `T` whose top-level `field` equals `value`, in
    /// insertion order.
    pub async fn find_by<T: Document>(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Row> = sqlx::query_as(SELECT_BY_FIELD)
            .bind(T::COLLECTION)
            .bind(field_path(field))
            .bind(encode_value(value.into()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id, body, _)| decode(id, body)).collect()
    }

    pub async fn list<T: Document>(&self) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Row> = sqlx::query_as(SELECT_ALL)
            .bind(T::COLLECTION)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id, body, _)| decode(id, body)).collect()
    }

    pub async fn insert<T: Document>(&self, doc: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        sqlx::query(INSERT)
            .bind(T::COLLECTION)
            .bind(doc.id())
            .bind(&body)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error::<T>(e, doc.id()))?;
        Ok(())
    }

    /// Blind upsert outside any transaction.
    pub async fn put<T: Document>(&self, doc: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        sqlx::query(UPSERT)
            .bind(T::COLLECTION)
            .bind(doc.id())
            .bind(&body)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete<T: Document>(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(T::COLLECTION)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
            versions: HashMap::new(),
        })
    }
}

/// An open store transaction. Dropping it without [`StoreTx::commit`] rolls
/// every write back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
    versions: HashMap<(&'static str, String), i64>,
}

impl StoreTx {
    fn track<T: Document>(&mut self, id: &str, version: i64) {
        self.versions.insert((T::COLLECTION, id.to_string()), version);
    }

    fn tracked<T: Document>(&self, id: &str) -> Option<i64> {
        self.versions.get(&(T::COLLECTION, id.to_string())).copied()
    }

    pub async fn get<T: Document>(&mut self, id: &str) -> Result<Option<T>, StoreError> {
        let row: Option<Row> = sqlx::query_as(SELECT_ONE)
            .bind(T::COLLECTION)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some((id, body, version)) => {
                let doc = decode(&id, &body)?;
                self.track::<T>(&id, version);
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by<T: Document>(
        &mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Row> = sqlx::query_as(SELECT_BY_FIELD)
            .bind(T::COLLECTION)
            .bind(field_path(field))
            .bind(encode_value(value.into()))
            .fetch_all(&mut *self.tx)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, body, version) in rows {
            docs.push(decode(&id, &body)?);
            self.track::<T>(&id, version);
        }
        Ok(docs)
    }

    pub async fn insert<T: Document>(&mut self, doc: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        sqlx::query(INSERT)
            .bind(T::COLLECTION)
            .bind(doc.id())
            .bind(&body)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| insert_error::<T>(e, doc.id()))?;
        self.track::<T>(doc.id(), 1);
        Ok(())
    }

    /// Write `doc` back. If this transaction read the document, the write only
    /// lands when nobody else changed it in between.
    pub async fn put<T: Document>(&mut self, doc: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().to_rfc3339();

        let Some(version) = self.tracked::<T>(doc.id()) else {
            sqlx::query(UPSERT)
                .bind(T::COLLECTION)
                .bind(doc.id())
                .bind(&body)
                .bind(&now)
                .execute(&mut *self.tx)
                .await?;
            return Ok(());
        };

        let result = sqlx::query(
            "UPDATE documents SET body = ?, version = version + 1, updated_at = ? \
             WHERE collection = ? AND id = ? AND version = ?",
        )
        .bind(&body)
        .bind(&now)
        .bind(T::COLLECTION)
        .bind(doc.id())
        .bind(version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        self.track::<T>(doc.id(), version + 1);
        Ok(())
    }

    pub async fn delete<T: Document>(&mut self, id: &str) -> Result<bool, StoreError> {
        let result = match self.tracked::<T>(id) {
            Some(version) => {
                let result = sqlx::query(
                    "DELETE FROM documents WHERE collection = ? AND id = ? AND version = ?",
                )
                .bind(T::COLLECTION)
                .bind(id)
                .bind(version)
                .execute(&mut *self.tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict);
                }
                result
            }
            None => {
                sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                    .bind(T::COLLECTION)
                    .bind(id)
                    .execute(&mut *self.tx)
                    .await?
            }
        };
        self.versions.remove(&(T::COLLECTION, id.to_string()));
        Ok(result.rows_affected() > 0)
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        id: String,
        team_id: String,
        week: u32,
        pinned: bool,
    }

    impl Document for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, team: &str, week: u32, pinned: bool) -> Note {
        Note {
            id: id.to_string(),
            team_id: team.to_string(),
            week,
            pinned,
        }
    }

    async fn store() -> Store {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Store::new(pool)
    }

    #[tokio::test]
    async fn find_by_matches_strings_numbers_and_bools() {
        let store = store().await;
        store.insert(&note("a", "t1", 1, true)).await.unwrap();
        store.insert(&note("b", "t1", 2, false)).await.unwrap();
        store.insert(&note("c", "t2", 1, false)).await.unwrap();

        let t1: Vec<Note> = store.find_by("teamId", "t1").await.unwrap();
        assert_eq!(t1.len(), 2);

        let week1: Vec<Note> = store.find_by("week", 1u32).await.unwrap();
        assert_eq!(week1.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["a", "c"]);

        let pinned: Vec<Note> = store.find_by("pinned", true).await.unwrap();
        assert_eq!(pinned, vec![note("a", "t1", 1, true)]);
    }

    #[tokio::test]
    async fn insert_twice_reports_existing_document() {
        let store = store().await;
        store.insert(&note("a", "t1", 1, false)).await.unwrap();
        let err = store.insert(&note("a", "t1", 1, false)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn malformed_body_fails_closed() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO documents (collection, id, body, version, updated_at) VALUES ('notes', 'x', '{\"id\":\"x\"}', 1, '')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert!(matches!(
            store.get::<Note>("x").await,
            Err(StoreError::Malformed { .. })
        ));
        assert!(matches!(
            store.list::<Note>().await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn stale_write_in_transaction_conflicts() {
        let store = store().await;
        store.insert(&note("a", "t1", 1, false)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut doc: Note = tx.get("a").await.unwrap().unwrap();
        // another writer bumps the version inside the same connection
        sqlx::query("UPDATE documents SET version = version + 1 WHERE id = 'a'")
            .execute(&mut *tx.tx)
            .await
            .unwrap();
        doc.pinned = true;
        assert!(matches!(tx.put(&doc).await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = store().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&note("a", "t1", 1, false)).await.unwrap();
        }
        assert!(store.get::<Note>("a").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert(&note("a", "t1", 1, false)).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.get::<Note>("a").await.unwrap().is_some());
    }

    // Two connections on a WAL file with a short busy wait.
    async fn wal_store() -> (Store, PathBuf) {
        let path = std::env::temp_dir().join(format!("logsphere-store-{}.db", uuid::Uuid::new_v4()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(50));
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        (Store::new(pool), path)
    }

    async fn remove(store: Store, path: PathBuf) {
        store.pool().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn write_lock_held_elsewhere_is_a_conflict() {
        let (store, path) = wal_store().await;
        store.insert(&note("a", "t1", 1, false)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut doc: Note = tx.get("a").await.unwrap().unwrap();
        doc.pinned = true;
        tx.put(&doc).await.unwrap();

        let err = store.put(&note("b", "t1", 2, false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        tx.commit().await.unwrap();
        store.put(&note("b", "t1", 2, false)).await.unwrap();
        remove(store, path).await;
    }

    #[tokio::test]
    async fn write_on_stale_snapshot_is_a_conflict() {
        let (store, path) = wal_store().await;
        store.insert(&note("a", "t1", 1, false)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let _: Note = tx.get("a").await.unwrap().unwrap();
        store.put(&note("a", "t1", 2, false)).await.unwrap();

        // an untracked document, so only SQLite can refuse the write
        let err = tx.put(&note("b", "t1", 3, false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        drop(tx);

        let a: Note = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.week, 2);
        assert!(store.get::<Note>("b").await.unwrap().is_none());
        remove(store, path).await;
    }
}
