//! libSQL backend: async `Database` trait implementation.
//!
//! Documents are stored as JSON text in a single `history_records` table,
//! keyed by id and scoped by `(user_id, collection)`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Collection, Database, Document, HistoryRecord, merge_fields};

/// Column order used by every SELECT; `row_to_record` depends on it.
const RECORD_COLUMNS: &str = "id, user_id, collection, data, created_at, updated_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
/// Read-merge-write updates hold `merge_lock` so concurrent merges into the
/// same document cannot drop each other's fields.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    merge_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            merge_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            merge_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn encode_document(data: &Document) -> Result<String, DatabaseError> {
    serde_json::to_string(data).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn decode_document(text: &str) -> Result<Document, DatabaseError> {
    serde_json::from_str(text).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Map a libsql Row to a HistoryRecord (column order: `RECORD_COLUMNS`).
fn row_to_record(row: &libsql::Row) -> Result<HistoryRecord, DatabaseError> {
    let get_text = |idx: i32| {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row column {idx}: {e}")))
    };

    let collection: Collection = get_text(2)?.parse()?;
    Ok(HistoryRecord {
        id: get_text(0)?,
        user_id: get_text(1)?,
        collection,
        data: decode_document(&get_text(3)?)?,
        created_at: parse_datetime(&get_text(4)?),
        updated_at: parse_datetime(&get_text(5)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_record(
        &self,
        user_id: &str,
        collection: Collection,
        data: &Document,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO history_records (id, user_id, collection, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.clone(),
                    user_id,
                    collection.as_str(),
                    encode_document(data)?,
                    now.clone(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_record: {e}")))?;

        debug!(record_id = %id, user_id, %collection, "Record inserted");
        Ok(id)
    }

    async fn list_records(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<Vec<HistoryRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM history_records WHERE user_id = ?1 AND collection = ?2 ORDER BY created_at ASC, rowid ASC"
                ),
                params![user_id, collection.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_records: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn get_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<Option<HistoryRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM history_records WHERE id = ?1 AND user_id = ?2 AND collection = ?3"
                ),
                params![id, user_id, collection.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_record: {e}"))),
        }
    }

    async fn update_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
        fields: &Document,
    ) -> Result<(), DatabaseError> {
        let not_found = || DatabaseError::NotFound {
            entity: collection.to_string(),
            id: id.to_string(),
        };

        let _guard = self.merge_lock.lock().await;

        let mut record = self
            .get_record(user_id, collection, id)
            .await?
            .ok_or_else(not_found)?;

        merge_fields(&mut record.data, fields);

        let updated = self
            .conn()
            .execute(
                "UPDATE history_records SET data = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4 AND collection = ?5",
                params![
                    encode_document(&record.data)?,
                    Utc::now().to_rfc3339(),
                    id,
                    user_id,
                    collection.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_record: {e}")))?;

        // Deleted between the read and the write.
        if updated == 0 {
            return Err(not_found());
        }

        debug!(record_id = %id, user_id, %collection, "Record updated");
        Ok(())
    }

    async fn delete_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<bool, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM history_records WHERE id = ?1 AND user_id = ?2 AND collection = ?3",
                params![id, user_id, collection.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_record: {e}")))?;

        debug!(record_id = %id, user_id, %collection, deleted, "Record delete");
        Ok(deleted > 0)
    }
}
