//! # Record Store
//!
//! Durable home of order records.
//!
//! ## Contract
//!
//! - `create` assigns the internal id. The reference arrives already generated and must be
//!   unique, a clash comes back as [`StoreError::Conflict`] so the caller can ask the client
//!   to retry.
//! - `emailed` is the only mutable field.
//! - `list` returns the most recent record first.
//! - Records are never deleted from here.
//!
//! Two backends: [`MemoryStore`] for tests and local runs, and the Redis store in
//! [`crate::redis_store`].
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Reference already taken: {0}")]
    Conflict(String),

    #[error("Record {0} not found")]
    Missing(u64),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: u64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub appliance: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub university: Option<String>,
    pub residence: Option<String>,
    pub months: u32,
    pub notes: String,
    pub emailed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub appliance: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub university: Option<String>,
    pub residence: Option<String>,
    pub months: u32,
    pub notes: String,
}

impl NewOrder {
    pub fn into_record(self, id: u64) -> OrderRecord {
        OrderRecord {
            id,
            reference: self.reference,
            created_at: self.created_at,
            appliance: self.appliance,
            full_name: self.full_name,
            email: self.email,
            phone: self.phone,
            university: self.university,
            residence: self.residence,
            months: self.months,
            notes: self.notes,
            emailed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    /// Counts every slug of a multi-appliance order separately.
    Appliance,
    Emailed,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<OrderRecord>, StoreError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, StoreError>;

    async fn update_emailed(&self, id: u64, emailed: bool) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn aggregate_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(group(&self.list().await?, field))
    }
}

pub fn group(records: &[OrderRecord], field: GroupField) -> BTreeMap<String, u64> {
    let mut groups = BTreeMap::new();

    for record in records {
        let keys = match field {
            GroupField::Appliance => catalog::split_slugs(&record.appliance)
                .into_iter()
                .map(str::to_string)
                .collect(),
            GroupField::Emailed => vec![record.emailed.to_string()],
        };

        for key in keys {
            *groups.entry(key).or_insert(0) += 1;
        }
    }

    groups
}

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    records: Vec<OrderRecord>,
}

/// Process-local store. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        let mut inner = self.inner.write().await;

        if inner.records.iter().any(|r| r.reference == order.reference) {
            return Err(StoreError::Conflict(order.reference));
        }

        inner.next_id += 1;
        let record = order.into_record(inner.next_id);
        inner.records.push(record.clone());

        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<OrderRecord>, StoreError> {
        let inner = self.inner.read().await;

        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, StoreError> {
        let inner = self.inner.read().await;

        Ok(inner
            .records
            .iter()
            .find(|r| r.reference == reference)
            .cloned())
    }

    async fn update_emailed(&self, id: u64, emailed: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::Missing(id))?;
        record.emailed = emailed;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        let inner = self.inner.read().await;

        let mut records = inner.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(records)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.records.len() as u64)
    }
}
