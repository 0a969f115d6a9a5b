//! # Plan Catalog
//!
//! Static list of rentable appliances.
//!
//! ## Rules
//!
//! - Catalog order is the display order. Resolution always follows it, never the order
//!   a client sent the slugs in, so the priced table reads the same for every customer.
//! - Unknown slugs are dropped without complaint. Rejecting an empty selection is the
//!   caller's job.
//! - Prices are captured into an order's notes at submission time. Changing a price
//!   here never rewrites history.
//! - "Due now" is the deposit total. The monthly total is informational.
use serde::Serialize;

pub const CURRENCY: &str = "R";

/// Separator used when a selection is stored as a single string.
pub const SLUG_SEPARATOR: &str = ", ";

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub slug: &'static str,
    pub name: &'static str,
    pub monthly: u32,
    pub deposit: u32,
    pub bullets: &'static [&'static str],
}

pub static PLANS: &[Plan] = &[
    Plan {
        slug: "bar-fridge",
        name: "Bar Fridge",
        monthly: 250,
        deposit: 500,
        bullets: &[
            "90 litre capacity with freezer box",
            "Fits under a residence desk",
            "Free delivery and collection",
        ],
    },
    Plan {
        slug: "microwave",
        name: "Microwave",
        monthly: 150,
        deposit: 300,
        bullets: &[
            "20 litre solo microwave",
            "Defrost and reheat presets",
            "Free delivery and collection",
        ],
    },
    Plan {
        slug: "two-plate-stove",
        name: "Two-Plate Stove",
        monthly: 180,
        deposit: 350,
        bullets: &[
            "Two solid hot plates",
            "Residence-approved wattage",
            "Free delivery and collection",
        ],
    },
    Plan {
        slug: "heater",
        name: "Oil Heater",
        monthly: 120,
        deposit: 250,
        bullets: &["Nine-fin oil heater", "Thermostat and tip-over cut-off"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub slug: String,
    pub name: String,
    pub monthly: u32,
    pub deposit: u32,
}

impl From<&Plan> for LineItem {
    fn from(plan: &Plan) -> Self {
        Self {
            slug: plan.slug.to_string(),
            name: plan.name.to_string(),
            monthly: plan.monthly,
            deposit: plan.deposit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub monthly_total: u32,
    pub deposit_total: u32,
    pub due_now: u32,
}

pub fn resolve<S: AsRef<str>>(slugs: &[S]) -> Vec<&'static Plan> {
    PLANS
        .iter()
        .filter(|plan| slugs.iter().any(|slug| slug.as_ref().trim() == plan.slug))
        .collect()
}

pub fn totals(plans: &[&Plan]) -> Totals {
    let monthly_total = plans.iter().map(|plan| plan.monthly).sum();
    let deposit_total = plans.iter().map(|plan| plan.deposit).sum();

    Totals {
        monthly_total,
        deposit_total,
        due_now: deposit_total,
    }
}

pub fn join_slugs(plans: &[&Plan]) -> String {
    plans
        .iter()
        .map(|plan| plan.slug)
        .collect::<Vec<_>>()
        .join(SLUG_SEPARATOR)
}

pub fn split_slugs(stored: &str) -> Vec<&str> {
    stored
        .split(',')
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .collect()
}

pub fn format_amount(amount: u32) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }

    format!("{CURRENCY}{grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_catalog_order() {
        let plans = resolve(&["microwave", "bar-fridge"]);
        let slugs: Vec<_> = plans.iter().map(|plan| plan.slug).collect();

        assert_eq!(slugs, vec!["bar-fridge", "microwave"]);
    }

    #[test]
    fn test_resolve_drops_unknown() {
        assert!(resolve(&["jacuzzi", ""]).is_empty());
        assert_eq!(resolve(&["heater", "jacuzzi"]).len(), 1);
    }

    #[test]
    fn test_resolve_ignores_duplicates() {
        assert_eq!(resolve(&["heater", "heater", " heater "]).len(), 1);
    }

    #[test]
    fn test_totals() {
        let plans = resolve(&["bar-fridge", "microwave"]);
        let totals = totals(&plans);

        assert_eq!(totals.monthly_total, 400);
        assert_eq!(totals.deposit_total, 800);
        assert_eq!(totals.due_now, totals.deposit_total);
    }

    #[test]
    fn test_slug_codec() {
        let plans = resolve(&["heater", "bar-fridge"]);
        let stored = join_slugs(&plans);

        assert_eq!(stored, "bar-fridge, heater");
        assert_eq!(split_slugs(&stored), vec!["bar-fridge", "heater"]);
        assert!(split_slugs(" , ").is_empty());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "R0");
        assert_eq!(format_amount(250), "R250");
        assert_eq!(format_amount(1250), "R1 250");
        assert_eq!(format_amount(1234567), "R1 234 567");
    }
}
