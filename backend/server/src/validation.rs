//! # Input Validation
//!
//! Fail-fast checks for both submission flows. The first failing field wins and its
//! message goes back to the client verbatim.
//!
//! Every free-text field is trimmed and then cut to the `*_MAX` constant below. Over-long
//! input is truncated, never rejected.
use std::sync::LazyLock;

use catalog::Plan;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{MIN_CONTACT_DWELL, MIN_MONTHS};

pub const FULL_NAME_MAX: usize = 120;
pub const EMAIL_MAX: usize = 254;
pub const PHONE_MAX: usize = 32;
pub const UNIVERSITY_MAX: usize = 120;
pub const RESIDENCE_MAX: usize = 160;
pub const DELIVERY_DATE_MAX: usize = 32;
pub const NOTES_MAX: usize = 2000;
pub const SUBJECT_MAX: usize = 160;
pub const MESSAGE_MAX: usize = 5000;
pub const FILE_NAME_MAX: usize = 180;
pub const CONTENT_TYPE_MAX: usize = 100;
pub const SLUG_MAX: usize = 40;

pub const MESSAGE_MIN: usize = 10;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

const fn fail(field: &'static str, message: &'static str) -> ValidationError {
    ValidationError { field, message }
}

pub const MALFORMED: ValidationError = fail("body", "Invalid request.");
pub const NO_APPLIANCE: ValidationError = fail("appliances", "Please select at least one appliance.");
pub const BAD_FULL_NAME: ValidationError = fail("fullName", "Please enter your full name.");
pub const BAD_EMAIL: ValidationError = fail("email", "Please enter a valid email address.");
pub const BAD_PHONE: ValidationError = fail("phone", "Please enter your phone number.");
pub const BAD_UNIVERSITY: ValidationError = fail("university", "Please enter your university.");
pub const BAD_RESIDENCE: ValidationError = fail("residence", "Please enter your residence.");
pub const BAD_MONTHS: ValidationError = fail("months", "The minimum rental period is 5 months.");
pub const BAD_DELIVERY_DATE: ValidationError = fail("deliveryDate", "Please choose a delivery date.");
pub const BAD_STUDENT_CARD: ValidationError = fail("studentCard", "Please upload your student card.");
pub const BAD_ID_COPY: ValidationError = fail("idCopy", "Please upload a copy of your ID.");
pub const BAD_FORM: ValidationError = fail("form", "Invalid submission.");
pub const BAD_SUBJECT: ValidationError = fail("subject", "Please enter a subject.");
pub const BAD_MESSAGE: ValidationError =
    fail("message", "Please enter a message of at least 10 characters.");

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadPayload {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderPayload {
    #[serde(alias = "slugs")]
    pub appliances: Vec<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub university: Option<String>,
    pub residence: Option<String>,
    pub months: Option<Value>,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
    pub student_card: Option<UploadPayload>,
    pub id_copy: Option<UploadPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContactPayload {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    /// Honeypot. Hidden from humans, bots fill it in.
    pub website: Option<String>,
    /// Client clock, milliseconds since the epoch, taken when the form was rendered.
    pub started_at: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub content_type: String,
    /// Base64, without any `data:` URL prefix.
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ValidOrder {
    pub plans: Vec<&'static Plan>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub university: String,
    pub residence: String,
    pub months: u32,
    pub delivery_date: String,
    pub notes: String,
    pub student_card: Upload,
    pub id_copy: Upload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidContact {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
}

pub fn clamp(value: Option<&str>, max: usize) -> String {
    value.unwrap_or_default().trim().chars().take(max).collect()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

fn required(value: Option<&str>, max: usize, error: ValidationError) -> Result<String, ValidationError> {
    let value = clamp(value, max);

    if value.is_empty() {
        return Err(error);
    }

    Ok(value)
}

fn email(value: Option<&str>) -> Result<String, ValidationError> {
    let value = clamp(value, EMAIL_MAX);

    if !is_valid_email(&value) {
        return Err(BAD_EMAIL);
    }

    Ok(value)
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

/// Whole months only. Anything that would not survive the trip to `u32` unchanged is rejected.
fn months(value: Option<&Value>) -> Result<u32, ValidationError> {
    match number(value) {
        Some(months)
            if months >= f64::from(MIN_MONTHS)
                && months <= f64::from(u32::MAX)
                && months.fract() == 0.0 =>
        {
            Ok(months as u32)
        }
        _ => Err(BAD_MONTHS),
    }
}

fn strip_data_url(content: &str) -> &str {
    match content.split_once(";base64,") {
        Some((head, body)) if head.starts_with("data:") => body,
        _ => content,
    }
}

fn upload(value: Option<&UploadPayload>, error: ValidationError) -> Result<Upload, ValidationError> {
    let value = value.ok_or(error)?;

    let name = clamp(value.name.as_deref(), FILE_NAME_MAX);
    let content = strip_data_url(value.content.as_deref().unwrap_or_default().trim()).to_string();

    if name.is_empty() || content.is_empty() {
        return Err(error);
    }

    let content_type = match clamp(value.content_type.as_deref(), CONTENT_TYPE_MAX) {
        t if t.is_empty() => "application/octet-stream".to_string(),
        t => t,
    };

    Ok(Upload {
        name,
        content_type,
        content,
    })
}

pub fn validate_order(payload: &OrderPayload) -> Result<ValidOrder, ValidationError> {
    let slugs: Vec<String> = payload
        .appliances
        .iter()
        .map(|slug| clamp(Some(slug.as_str()), SLUG_MAX))
        .collect();
    let plans = catalog::resolve(&slugs);
    if plans.is_empty() {
        return Err(NO_APPLIANCE);
    }

    Ok(ValidOrder {
        plans,
        full_name: required(payload.full_name.as_deref(), FULL_NAME_MAX, BAD_FULL_NAME)?,
        email: email(payload.email.as_deref())?,
        phone: required(payload.phone.as_deref(), PHONE_MAX, BAD_PHONE)?,
        university: required(payload.university.as_deref(), UNIVERSITY_MAX, BAD_UNIVERSITY)?,
        residence: required(payload.residence.as_deref(), RESIDENCE_MAX, BAD_RESIDENCE)?,
        months: months(payload.months.as_ref())?,
        delivery_date: required(
            payload.delivery_date.as_deref(),
            DELIVERY_DATE_MAX,
            BAD_DELIVERY_DATE,
        )?,
        student_card: upload(payload.student_card.as_ref(), BAD_STUDENT_CARD)?,
        id_copy: upload(payload.id_copy.as_ref(), BAD_ID_COPY)?,
        notes: clamp(payload.notes.as_deref(), NOTES_MAX),
    })
}

/// `now_ms` is the server clock in milliseconds since the epoch.
pub fn validate_contact(payload: &ContactPayload, now_ms: i64) -> Result<ValidContact, ValidationError> {
    if !clamp(payload.website.as_deref(), FULL_NAME_MAX).is_empty() {
        return Err(BAD_FORM);
    }

    let dwell_ms = MIN_CONTACT_DWELL.as_millis() as f64;
    match number(payload.started_at.as_ref()) {
        Some(started) if (now_ms as f64 - started) > dwell_ms => {}
        _ => return Err(BAD_FORM),
    }

    let full_name = required(payload.full_name.as_deref(), FULL_NAME_MAX, BAD_FULL_NAME)?;
    let email = email(payload.email.as_deref())?;
    let phone = required(payload.phone.as_deref(), PHONE_MAX, BAD_PHONE)?;
    let subject = required(payload.subject.as_deref(), SUBJECT_MAX, BAD_SUBJECT)?;

    let message = clamp(payload.message.as_deref(), MESSAGE_MAX);
    if message.chars().count() < MESSAGE_MIN {
        return Err(BAD_MESSAGE);
    }

    Ok(ValidContact {
        full_name,
        email,
        phone,
        subject,
        message,
    })
}
