//! # Notification Dispatch
//!
//! ## Orders
//!
//! - Customer copy first, then the admin copy. Each send is contained, neither failure
//!   reaches the caller and the admin copy is attempted either way.
//! - The record's `emailed` flag tracks the customer copy only. It is written after both
//!   attempts and only when the customer copy went out.
//! - Without a configured transport nothing is sent and the result is `false`.
//!
//! ## Contact
//!
//! No record backs a contact message, so the emails are the whole effect. Any failure is
//! returned to the caller.
use std::{fmt::Write, sync::Arc};

use catalog::{Plan, format_amount, totals};
use tracing::{error, info, warn};

use crate::{
    database::{OrderRecord, RecordStore},
    mailer::{Attachment, Email, NotifyError, Notifier},
    validation::ValidContact,
};

pub struct Dispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    admin_email: Option<String>,
    store: Arc<dyn RecordStore>,
}

impl Dispatcher {
    pub fn new(
        notifier: Option<Arc<dyn Notifier>>,
        admin_email: Option<String>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            notifier,
            admin_email,
            store,
        }
    }

    /// Returns whether the customer copy was sent and recorded.
    pub async fn notify_order(
        &self,
        record: &OrderRecord,
        plans: &[&Plan],
        attachments: Vec<Attachment>,
    ) -> bool {
        let Some(notifier) = &self.notifier else {
            warn!(reference = %record.reference, "Mail transport not configured, skipping order emails");
            return false;
        };

        let customer_sent = match notifier.send(&order_customer_email(record, plans)).await {
            Ok(()) => {
                info!(reference = %record.reference, "Customer order email sent");
                true
            }
            Err(e) => {
                error!(reference = %record.reference, error = %e, "Customer order email failed");
                false
            }
        };

        if let Some(admin) = &self.admin_email {
            let email = order_admin_email(record, plans, admin, attachments);

            match notifier.send(&email).await {
                Ok(()) => info!(reference = %record.reference, "Admin order email sent"),
                Err(e) => {
                    error!(reference = %record.reference, error = %e, "Admin order email failed")
                }
            }
        }

        if !customer_sent {
            return false;
        }

        match self.store.update_emailed(record.id, true).await {
            Ok(()) => true,
            Err(e) => {
                error!(reference = %record.reference, error = %e, "Failed to record emailed flag");
                false
            }
        }
    }

    pub async fn notify_contact(
        &self,
        contact: &ValidContact,
        reference: &str,
    ) -> Result<(), NotifyError> {
        let (Some(notifier), Some(admin)) = (&self.notifier, &self.admin_email) else {
            return Err(NotifyError::NotConfigured);
        };

        notifier
            .send(&contact_admin_email(contact, reference, admin))
            .await?;
        notifier
            .send(&contact_customer_email(contact, reference))
            .await?;

        info!(reference, "Contact emails sent");

        Ok(())
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());

    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

fn plan_lines(plans: &[&Plan]) -> String {
    let mut text = String::new();
    let totals = totals(plans);

    for plan in plans {
        let _ = writeln!(
            text,
            "- {}: {}/month, deposit {}",
            plan.name,
            format_amount(plan.monthly),
            format_amount(plan.deposit)
        );
    }
    let _ = writeln!(text, "\nMonthly total: {}", format_amount(totals.monthly_total));
    let _ = writeln!(text, "Deposit total: {}", format_amount(totals.deposit_total));
    let _ = writeln!(text, "Due now: {}", format_amount(totals.due_now));

    text
}

fn plan_table(plans: &[&Plan]) -> String {
    let totals = totals(plans);
    let mut html = String::from(
        "<table><thead><tr><th>Appliance</th><th>Monthly</th><th>Deposit</th></tr></thead><tbody>",
    );

    for plan in plans {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(plan.name),
            format_amount(plan.monthly),
            format_amount(plan.deposit)
        );
    }
    let _ = write!(
        html,
        "</tbody><tfoot><tr><th>Total</th><td>{}</td><td>{}</td></tr></tfoot></table>\
         <p><strong>Due now:</strong> {}</p>",
        format_amount(totals.monthly_total),
        format_amount(totals.deposit_total),
        format_amount(totals.due_now)
    );

    html
}

/// The delivery date only survives in the priced summary appended after the customer's
/// own notes, so the last matching line wins.
fn delivery_date(record: &OrderRecord) -> &str {
    record
        .notes
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("Delivery date: "))
        .unwrap_or("to be confirmed")
}

fn paragraphs(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

pub fn order_customer_email(record: &OrderRecord, plans: &[&Plan]) -> Email {
    let text = format!(
        "Hi {name},\n\nThanks for your rental request. Your reference is {reference}.\n\n{lines}\nRental period: {months} months\nDelivery date: {delivery}\n\nWe will be in touch to confirm delivery.\n",
        name = record.full_name,
        reference = record.reference,
        lines = plan_lines(plans),
        months = record.months,
        delivery = delivery_date(record),
    );
    let html = format!(
        "<p>Hi {name},</p><p>Thanks for your rental request. Your reference is <strong>{reference}</strong>.</p>{table}<p>Rental period: {months} months<br>Delivery date: {delivery}</p><p>We will be in touch to confirm delivery.</p>",
        name = escape_html(&record.full_name),
        reference = escape_html(&record.reference),
        table = plan_table(plans),
        months = record.months,
        delivery = escape_html(delivery_date(record)),
    );

    Email {
        to: record.email.clone(),
        subject: format!("Your rental request {}", record.reference),
        text,
        html,
        reply_to: None,
        attachments: Vec::new(),
    }
}

pub fn order_admin_email(
    record: &OrderRecord,
    plans: &[&Plan],
    admin: &str,
    attachments: Vec<Attachment>,
) -> Email {
    let university = record.university.as_deref().unwrap_or_default();
    let residence = record.residence.as_deref().unwrap_or_default();

    let text = format!(
        "New rental order {reference}\n\nName: {name}\nEmail: {email}\nPhone: {phone}\nUniversity: {university}\nResidence: {residence}\nMonths: {months}\n\n{lines}\nNotes:\n{notes}\n",
        reference = record.reference,
        name = record.full_name,
        email = record.email,
        phone = record.phone,
        months = record.months,
        lines = plan_lines(plans),
        notes = record.notes,
    );
    let html = format!(
        "<h2>New rental order {reference}</h2><p>Name: {name}<br>Email: {email}<br>Phone: {phone}<br>University: {university}<br>Residence: {residence}<br>Months: {months}</p>{table}<h3>Notes</h3><p>{notes}</p>",
        reference = escape_html(&record.reference),
        name = escape_html(&record.full_name),
        email = escape_html(&record.email),
        phone = escape_html(&record.phone),
        university = escape_html(university),
        residence = escape_html(residence),
        months = record.months,
        table = plan_table(plans),
        notes = paragraphs(&record.notes),
    );

    Email {
        to: admin.to_string(),
        subject: format!("New rental order {}", record.reference),
        text,
        html,
        reply_to: Some(record.email.clone()),
        attachments,
    }
}

pub fn contact_admin_email(contact: &ValidContact, reference: &str, admin: &str) -> Email {
    let text = format!(
        "Contact message {reference}\n\nName: {name}\nEmail: {email}\nPhone: {phone}\nSubject: {subject}\n\n{message}\n",
        name = contact.full_name,
        email = contact.email,
        phone = contact.phone,
        subject = contact.subject,
        message = contact.message,
    );
    let html = format!(
        "<h2>Contact message {reference}</h2><p>Name: {name}<br>Email: {email}<br>Phone: {phone}<br>Subject: {subject}</p><p>{message}</p>",
        reference = escape_html(reference),
        name = escape_html(&contact.full_name),
        email = escape_html(&contact.email),
        phone = escape_html(&contact.phone),
        subject = escape_html(&contact.subject),
        message = paragraphs(&contact.message),
    );

    Email {
        to: admin.to_string(),
        subject: format!("Contact: {} ({reference})", contact.subject),
        text,
        html,
        reply_to: Some(contact.email.clone()),
        attachments: Vec::new(),
    }
}

pub fn contact_customer_email(contact: &ValidContact, reference: &str) -> Email {
    let text = format!(
        "Hi {name},\n\nWe received your message and will reply soon. Your reference is {reference}.\n",
        name = contact.full_name,
    );
    let html = format!(
        "<p>Hi {name},</p><p>We received your message and will reply soon. Your reference is <strong>{reference}</strong>.</p>",
        name = escape_html(&contact.full_name),
        reference = escape_html(reference),
    );

    Email {
        to: contact.email.clone(),
        subject: format!("We received your message ({reference})"),
        text,
        html,
        reply_to: None,
        attachments: Vec::new(),
    }
}
