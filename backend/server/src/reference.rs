//! Public references: `<PREFIX>-<YYMMDD>-<XXXX>` for orders and `<PREFIX>-C-<YYMMDD>-<XXXX>`
//! for contact messages.
//!
//! Both flows take the calendar date in UTC. The suffix is 16 random bits from the thread
//! CSPRNG. Nothing here checks the store, uniqueness is enforced at record creation.
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Order,
    Contact,
}

pub fn generate(prefix: &str, category: Category, now: DateTime<Utc>) -> String {
    format_reference(prefix, category, now, rand::random())
}

fn format_reference(prefix: &str, category: Category, now: DateTime<Utc>, suffix: u16) -> String {
    let date = now.format("%y%m%d");

    match category {
        Category::Order => format!("{prefix}-{date}-{suffix:04X}"),
        Category::Contact => format!("{prefix}-C-{date}-{suffix:04X}"),
    }
}
