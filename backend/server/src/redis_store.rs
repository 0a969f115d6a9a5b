//! # Redis
//!
//! Production record store.
//!
//! ## Layout
//!
//! - `orders:next_id`: counter, `INCR` hands out internal ids
//! - `orders:references`: hash of reference to id, `HSETNX` is the uniqueness guard
//! - `order:<id>`: hash holding the record fields
//! - `orders:recent`: sorted set of ids scored by creation time in milliseconds
//!
//! The reference is claimed before the body is written. A failed body write leaves a
//! claimed reference with no record behind it, which only means that reference is burnt.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::database::{NewOrder, OrderRecord, RecordStore, StoreError};

const NEXT_ID_KEY: &str = "orders:next_id";
const REFERENCE_INDEX: &str = "orders:references";
const RECENT_KEY: &str = "orders:recent";

fn record_key(id: u64) -> String {
    format!("order:{id}")
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        let mut connection = self.connection.clone();

        let id: u64 = connection.incr(NEXT_ID_KEY, 1).await?;

        let claimed: bool = connection
            .hset_nx(REFERENCE_INDEX, &order.reference, id)
            .await?;
        if !claimed {
            return Err(StoreError::Conflict(order.reference));
        }

        let record = order.into_record(id);
        let fields = to_fields(&record);

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(record_key(id), &fields)
            .ignore()
            .zadd(RECENT_KEY, id, record.created_at.timestamp_millis())
            .ignore()
            .query_async(&mut connection)
            .await?;

        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<OrderRecord>, StoreError> {
        let mut connection = self.connection.clone();

        let fields: HashMap<String, String> = connection.hgetall(record_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        from_fields(id, &fields).map(Some)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<OrderRecord>, StoreError> {
        let mut connection = self.connection.clone();

        let id: Option<u64> = connection.hget(REFERENCE_INDEX, reference).await?;

        match id {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn update_emailed(&self, id: u64, emailed: bool) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();

        let exists: bool = connection.exists(record_key(id)).await?;
        if !exists {
            return Err(StoreError::Missing(id));
        }

        let _: () = connection
            .hset(record_key(id), "emailed", flag(emailed))
            .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        let mut connection = self.connection.clone();

        let ids: Vec<u64> = connection.zrevrange(RECENT_KEY, 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(record_key(*id));
        }
        let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        ids.iter()
            .zip(rows.iter())
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(id, fields)| from_fields(*id, fields))
            .collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.zcard(RECENT_KEY).await?)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn to_fields(record: &OrderRecord) -> Vec<(&'static str, String)> {
    vec![
        ("reference", record.reference.clone()),
        ("created_at", record.created_at.to_rfc3339()),
        ("appliance", record.appliance.clone()),
        ("full_name", record.full_name.clone()),
        ("email", record.email.clone()),
        ("phone", record.phone.clone()),
        ("university", record.university.clone().unwrap_or_default()),
        ("residence", record.residence.clone().unwrap_or_default()),
        ("months", record.months.to_string()),
        ("notes", record.notes.clone()),
        ("emailed", flag(record.emailed).to_string()),
    ]
}

fn from_fields(id: u64, fields: &HashMap<String, String>) -> Result<OrderRecord, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt { id, reason };

    let get = |name: &str| {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| corrupt(format!("missing field {name}")))
    };
    let optional = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();

    let created_at = DateTime::parse_from_rfc3339(&get("created_at")?)
        .map_err(|e| corrupt(format!("created_at: {e}")))?
        .with_timezone(&Utc);
    let months: u32 = get("months")?
        .parse()
        .map_err(|e| corrupt(format!("months: {e}")))?;

    Ok(OrderRecord {
        id,
        reference: get("reference")?,
        created_at,
        appliance: get("appliance")?,
        full_name: get("full_name")?,
        email: get("email")?,
        phone: get("phone")?,
        university: optional("university"),
        residence: optional("residence"),
        months,
        notes: fields.get("notes").cloned().unwrap_or_default(),
        emailed: fields.get("emailed").is_some_and(|v| v == "1"),
    })
}
