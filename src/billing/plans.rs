use serde::Serialize;

use crate::access::Tier;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    OneTime,
    Month,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Plan {
    pub tier: Tier,
    pub name: &'static str,
    pub price_cents: i64,
    pub currency: &'static str,
    pub interval: BillingInterval,
    pub features: Vec<&'static str>,
}

impl Plan {
    pub fn is_recurring(&self) -> bool {
        self.interval == BillingInterval::Month
    }
}

/// Every tier's public pricing, free included.
pub fn plans() -> Vec<Plan> {
    Tier::ALL.into_iter().map(plan).collect()
}

/// The purchasable plan for `tier`. Free cannot be bought.
pub fn plan_for(tier: Tier) -> Option<Plan> {
    match tier {
        Tier::Free => None,
        other => Some(plan(other)),
    }
}

fn plan(tier: Tier) -> Plan {
    match tier {
        Tier::Free => Plan {
            tier,
            name: "Free",
            price_cents: 0,
            currency: "usd",
            interval: BillingInterval::Month,
            features: vec!["Browse the full template catalog", "Template previews"],
        },
        Tier::Individual => Plan {
            tier,
            name: "Individual",
            price_cents: 5000,
            currency: "usd",
            interval: BillingInterval::OneTime,
            features: vec!["One template download or AI generated document"],
        },
        Tier::Professional => Plan {
            tier,
            name: "Professional",
            price_cents: 5000,
            currency: "usd",
            interval: BillingInterval::Month,
            features: vec![
                "2 template downloads per month",
                "4 AI suggestions per month",
                "6 AI generated documents per month",
            ],
        },
        Tier::Enterprise => Plan {
            tier,
            name: "Enterprise",
            price_cents: 15000,
            currency: "usd",
            interval: BillingInterval::Month,
            features: vec![
                "Unlimited downloads",
                "Unlimited AI suggestions and generation",
                "Monday.com, Smartsheet, Google Sheets and Microsoft 365 export",
                "Priority support",
            ],
        },
    }
}
