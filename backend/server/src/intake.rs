//! # Intake
//!
//! ## Orders
//! 1. Rate limit on the client address
//! 2. Validate fields and resolve appliances against the catalog
//! 3. Generate the reference
//! 4. Persist the record. Nothing is emailed unless this succeeds.
//! 5. Dispatch notifications. A mail failure does not fail the order, it shows up as
//!    `emailed: false` and stays fixable from the admin side.
//!
//! ## Contact
//! Same front half, no record. The emails are the only effect, so a mail failure is a
//! server error.
use std::fmt::Write;

use catalog::{LineItem, Totals, format_amount};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::{CONTACT_RATE, ORDER_RATE, RatePolicy},
    database::NewOrder,
    error::AppError,
    mailer::Attachment,
    rate_limit::RateDecision,
    reference::{self, Category},
    state::AppState,
    validation::{ContactPayload, OrderPayload, Upload, ValidOrder, validate_contact, validate_order},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub slugs: Vec<String>,
    pub items: Vec<LineItem>,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub ok: bool,
    pub reference: String,
    pub emailed: bool,
    pub selected: Selection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactReceipt {
    pub ok: bool,
    pub reference: String,
}

async fn enforce_rate(
    state: &AppState,
    flow: &str,
    client: &str,
    policy: &RatePolicy,
) -> Result<(), AppError> {
    let key = format!("{flow}:{client}");

    match state.limiter.check(&key, policy).await {
        RateDecision::Allowed => Ok(()),
        RateDecision::Limited { retry_after } => {
            warn!(flow, client, "Rate limited");
            Err(AppError::RateLimited { retry_after })
        }
    }
}

/// User notes followed by the priced summary, so the record keeps what was quoted.
fn compose_notes(order: &ValidOrder, totals: &Totals) -> String {
    let mut notes = String::new();

    if !order.notes.is_empty() {
        let _ = writeln!(notes, "{}\n", order.notes);
    }
    let _ = writeln!(notes, "Delivery date: {}", order.delivery_date);
    let _ = writeln!(notes, "Monthly total: {}", format_amount(totals.monthly_total));
    let _ = writeln!(notes, "Deposit total: {}", format_amount(totals.deposit_total));
    let _ = write!(notes, "Due now: {}", format_amount(totals.due_now));

    notes
}

fn attachment(label: &str, upload: &Upload) -> Attachment {
    Attachment {
        filename: format!("{label}-{}", upload.name),
        content_type: upload.content_type.clone(),
        content: upload.content.clone(),
    }
}

pub async fn submit_order(
    state: &AppState,
    payload: OrderPayload,
    client: &str,
) -> Result<OrderReceipt, AppError> {
    enforce_rate(state, "order", client, &ORDER_RATE).await?;

    let order = validate_order(&payload).inspect_err(|e| {
        warn!(field = e.field, "Order rejected");
    })?;

    let now = Utc::now();
    let reference = reference::generate(&state.config.reference_prefix, Category::Order, now);
    let totals = catalog::totals(&order.plans);

    let record = state
        .store
        .create(NewOrder {
            reference,
            created_at: now,
            appliance: catalog::join_slugs(&order.plans),
            full_name: order.full_name.clone(),
            email: order.email.clone(),
            phone: order.phone.clone(),
            university: Some(order.university.clone()),
            residence: Some(order.residence.clone()),
            months: order.months,
            notes: compose_notes(&order, &totals),
        })
        .await
        .inspect_err(|e| warn!(error = %e, "Order not recorded"))?;

    info!(id = record.id, reference = %record.reference, "Order recorded");

    let attachments = vec![
        attachment("student-card", &order.student_card),
        attachment("id-copy", &order.id_copy),
    ];
    let emailed = state
        .dispatcher
        .notify_order(&record, &order.plans, attachments)
        .await;

    Ok(OrderReceipt {
        ok: true,
        reference: record.reference,
        emailed,
        selected: Selection {
            slugs: order.plans.iter().map(|plan| plan.slug.to_string()).collect(),
            items: order.plans.iter().map(|plan| LineItem::from(*plan)).collect(),
            totals,
        },
    })
}

pub async fn submit_contact(
    state: &AppState,
    payload: ContactPayload,
    client: &str,
) -> Result<ContactReceipt, AppError> {
    enforce_rate(state, "contact", client, &CONTACT_RATE).await?;

    let now = Utc::now();
    let contact = validate_contact(&payload, now.timestamp_millis()).inspect_err(|e| {
        warn!(field = e.field, "Contact rejected");
    })?;

    let reference = reference::generate(&state.config.reference_prefix, Category::Contact, now);

    state
        .dispatcher
        .notify_contact(&contact, &reference)
        .await
        .map_err(|e| AppError::Internal(format!("contact {reference}: {e}")))?;

    Ok(ContactReceipt {
        ok: true,
        reference,
    })
}
