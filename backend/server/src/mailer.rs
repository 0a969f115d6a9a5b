//! # Mail Transport
//!
//! One message, one recipient. [`HttpMailer`] posts to a transactional mail HTTP API
//! (Resend-compatible JSON). Attachments travel as the base64 the client uploaded.
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail transport not configured")]
    NotConfigured,

    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct OutgoingAttachment<'a> {
    filename: &'a str,
    content: &'a str,
    content_type: &'a str,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<OutgoingAttachment<'a>>,
}

pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    /// `None` when no API key is configured.
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;

        Some(Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let outgoing = OutgoingEmail {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            text: &email.text,
            html: &email.html,
            reply_to: email.reply_to.as_deref(),
            attachments: email
                .attachments
                .iter()
                .map(|attachment| OutgoingAttachment {
                    filename: &attachment.filename,
                    content: &attachment.content,
                    content_type: &attachment.content_type,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&outgoing)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
