//! `Database` trait: async interface for per-user history documents.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::DatabaseError;

/// A schemaless JSON document body.
pub type Document = Map<String, Value>;

/// Which per-user collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Workout,
    Nutrition,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Workout => "workoutHistory",
            Collection::Nutrition => "nutritionHistory",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workoutHistory" => Ok(Collection::Workout),
            "nutritionHistory" => Ok(Collection::Nutrition),
            other => Err(DatabaseError::Serialization(format!(
                "unknown collection {other}"
            ))),
        }
    }
}

/// A stored history document.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    pub collection: Collection,
    pub data: Document,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic persistence for history documents.
///
/// Every operation is scoped to `(user_id, collection)`; a record id from
/// one user never resolves for another.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Store a new document. Returns the generated id.
    async fn insert_record(
        &self,
        user_id: &str,
        collection: Collection,
        data: &Document,
    ) -> Result<String, DatabaseError>;

    /// All documents in a collection, oldest first.
    async fn list_records(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<Vec<HistoryRecord>, DatabaseError>;

    /// Fetch a single document.
    async fn get_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<Option<HistoryRecord>, DatabaseError>;

    /// Overwrite the top-level fields present in `fields`, keeping the rest.
    ///
    /// Fails with [`DatabaseError::NotFound`] if the document does not exist.
    async fn update_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
        fields: &Document,
    ) -> Result<(), DatabaseError>;

    /// Delete a document. Deleting a missing id is not an error; the return
    /// value says whether anything was removed.
    async fn delete_record(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<bool, DatabaseError>;
}

/// Shallow merge: each key in `fields` replaces the same key in `target`.
pub fn merge_fields(target: &mut Document, fields: &Document) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}
