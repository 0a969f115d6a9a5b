use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

/// Business minimum rental period in months.
pub const MIN_MONTHS: u32 = 5;

/// Minimum time a human needs to fill in the contact form.
pub const MIN_CONTACT_DWELL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

pub const ORDER_RATE: RatePolicy = RatePolicy {
    max_requests: 6,
    window: Duration::from_secs(60),
};

pub const CONTACT_RATE: RatePolicy = RatePolicy {
    max_requests: 4,
    window: Duration::from_secs(60),
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
    pub admin_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub reference_prefix: String,
    pub max_body_bytes: usize,
    pub admin_token: Option<String>,
    pub mail: MailConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "3000")?,
            redis_url: optional("REDIS_URL"),
            allowed_origins: optional("ALLOWED_ORIGINS")
                .map(|origins| split_list(&origins))
                .unwrap_or_default(),
            reference_prefix: try_load("REFERENCE_PREFIX", "RNT")?,
            max_body_bytes: try_load("MAX_BODY_BYTES", "12582912")?,
            admin_token: read_secret("ADMIN_TOKEN"),
            mail: MailConfig {
                api_url: try_load("MAIL_API_URL", "https://api.resend.com/emails")?,
                api_key: read_secret("MAIL_API_KEY"),
                from: try_load("MAIL_FROM", "Student Rentals <orders@localhost>")?,
                admin_email: optional("ADMIN_EMAIL"),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            redis_url: None,
            allowed_origins: Vec::new(),
            reference_prefix: "RNT".to_string(),
            max_body_bytes: 12 * 1024 * 1024,
            admin_token: None,
            mail: MailConfig {
                api_url: "https://api.resend.com/emails".to_string(),
                api_key: None,
                from: "Student Rentals <orders@localhost>".to_string(),
                admin_email: None,
            },
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional(key: &str) -> Option<String> {
    let value = var(key);

    if value.is_none() {
        info!("{key} not set");
    }

    value
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

/// Docker secret first, then the plain environment.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) if !secret.trim().is_empty() => Some(secret.trim().to_string()),
        _ => {
            let value = var(secret_name);
            if value.is_none() {
                warn!("{secret_name} not found in secrets or environment");
            }
            value
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().trim_end_matches('/').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
