//! # Admin Reconciliation
//!
//! Staff-side actions over existing order records, shared by the HTTP admin routes and
//! the `rental-admin` CLI. Callers are assumed to be authenticated.
//!
//! - **toggle**: flips `emailed`, nothing else.
//! - **resend**: re-sends from the stored record. Every call sends again, a success only
//!   ever sets `emailed` to `true`, and a failure leaves the flag alone. The original
//!   uploads are not stored, so the admin copy goes out without attachments.
use std::{collections::BTreeMap, fmt::Write};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    database::{GroupField, OrderRecord, RecordStore, StoreError},
    notify::Dispatcher,
};

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Order {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Either the internal id or the public reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Id(u64),
    Reference(String),
}

impl RecordKey {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        match raw.parse() {
            Ok(id) => RecordKey::Id(id),
            Err(_) => RecordKey::Reference(raw.to_string()),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "#{id}"),
            RecordKey::Reference(reference) => write!(f, "{reference}"),
        }
    }
}

pub async fn find(store: &dyn RecordStore, key: &RecordKey) -> Result<OrderRecord, AdminError> {
    let record = match key {
        RecordKey::Id(id) => store.find_by_id(*id).await?,
        RecordKey::Reference(reference) => store.find_by_reference(reference).await?,
    };

    record.ok_or_else(|| AdminError::NotFound(key.to_string()))
}

/// Returns the record as it is after the flip.
pub async fn toggle_emailed(
    store: &dyn RecordStore,
    key: &RecordKey,
) -> Result<OrderRecord, AdminError> {
    let mut record = find(store, key).await?;

    record.emailed = !record.emailed;
    store.update_emailed(record.id, record.emailed).await?;

    info!(reference = %record.reference, emailed = record.emailed, "Admin toggled emailed flag");

    Ok(record)
}

/// Returns whether the customer copy went out. A failed send is not an error.
pub async fn resend(
    store: &dyn RecordStore,
    dispatcher: &Dispatcher,
    key: &RecordKey,
) -> Result<bool, AdminError> {
    let record = find(store, key).await?;
    let plans = catalog::resolve(&catalog::split_slugs(&record.appliance));

    let emailed = dispatcher.notify_order(&record, &plans, Vec::new()).await;

    if emailed {
        info!(reference = %record.reference, "Admin resend delivered");
    } else {
        warn!(reference = %record.reference, "Admin resend did not deliver");
    }

    Ok(emailed)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: u64,
    pub by_appliance: BTreeMap<String, u64>,
    pub by_emailed: BTreeMap<String, u64>,
}

pub async fn stats(store: &dyn RecordStore) -> Result<Stats, AdminError> {
    Ok(Stats {
        total: store.count().await?,
        by_appliance: store.aggregate_by(GroupField::Appliance).await?,
        by_emailed: store.aggregate_by(GroupField::Emailed).await?,
    })
}

pub const CSV_HEADER: [&str; 11] = [
    "created_at",
    "reference",
    "appliance",
    "full_name",
    "email",
    "phone",
    "months",
    "university",
    "residence",
    "emailed",
    "notes",
];

/// Every cell is quoted, embedded quotes are doubled.
pub fn csv_escape(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| csv_escape(cell))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn export_csv(records: &[OrderRecord]) -> String {
    let header: Vec<String> = CSV_HEADER.iter().map(|name| name.to_string()).collect();
    let mut csv = csv_row(&header);
    csv.push_str("\r\n");

    for record in records {
        let row = [
            record.created_at.to_rfc3339(),
            record.reference.clone(),
            record.appliance.clone(),
            record.full_name.clone(),
            record.email.clone(),
            record.phone.clone(),
            record.months.to_string(),
            record.university.clone().unwrap_or_default(),
            record.residence.clone().unwrap_or_default(),
            record.emailed.to_string(),
            record.notes.clone(),
        ];
        let _ = write!(csv, "{}\r\n", csv_row(&row));
    }

    csv
}
