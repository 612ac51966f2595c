//! Subscription tiers and the static capability table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription level of a user.
///
/// Stored as lowercase text. Anything unrecognised reads as [`Tier::Free`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    /// One-time purchase with a lifetime allotment.
    Individual,
    Professional,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Individual, Tier::Professional, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Individual => "individual",
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Tier> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "individual" => Some(Tier::Individual),
            "professional" => Some(Tier::Professional),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    pub fn from_stored(value: Option<&str>) -> Tier {
        value.and_then(Tier::parse).unwrap_or(Tier::Free)
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Tier::Free => Capabilities {
                downloads: Quota::None,
                ai_suggestions: Quota::None,
                ai_generations: Quota::None,
                platform_integrations: false,
                priority_support: false,
            },
            Tier::Individual => Capabilities {
                downloads: Quota::Lifetime(1),
                ai_suggestions: Quota::None,
                ai_generations: Quota::Lifetime(1),
                platform_integrations: false,
                priority_support: false,
            },
            Tier::Professional => Capabilities {
                downloads: Quota::Monthly(2),
                ai_suggestions: Quota::Monthly(4),
                ai_generations: Quota::Monthly(6),
                platform_integrations: false,
                priority_support: false,
            },
            Tier::Enterprise => Capabilities {
                downloads: Quota::Unlimited,
                ai_suggestions: Quota::Unlimited,
                ai_generations: Quota::Unlimited,
                platform_integrations: true,
                priority_support: true,
            },
        }
    }

    /// Whether usage counters roll over with the billing period.
    pub fn resets_monthly(&self) -> bool {
        !matches!(self, Tier::Individual)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gated action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Download,
    AiSuggestion,
    AiGeneration,
    PlatformIntegration,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Download => "download",
            Action::AiSuggestion => "ai_suggestion",
            Action::AiGeneration => "ai_generation",
            Action::PlatformIntegration => "platform_integration",
        }
    }

    /// The usage counter this action draws from, if it is metered.
    pub fn counter(&self) -> Option<UsageCounter> {
        match self {
            Action::Download => Some(UsageCounter::Downloads),
            Action::AiSuggestion => Some(UsageCounter::AiSuggestions),
            Action::AiGeneration => Some(UsageCounter::AiGenerations),
            Action::PlatformIntegration => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Quota {
    /// Action not included in the tier.
    None,
    Monthly(i32),
    /// Never resets. Lifetime quotas on a tier share one pool.
    Lifetime(i32),
    Unlimited,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Capabilities {
    pub downloads: Quota,
    pub ai_suggestions: Quota,
    pub ai_generations: Quota,
    pub platform_integrations: bool,
    pub priority_support: bool,
}

impl Capabilities {
    pub fn quota_for(&self, counter: UsageCounter) -> Quota {
        match counter {
            UsageCounter::Downloads => self.downloads,
            UsageCounter::AiSuggestions => self.ai_suggestions,
            UsageCounter::AiGenerations => self.ai_generations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageCounter {
    Downloads,
    AiSuggestions,
    AiGenerations,
}

impl UsageCounter {
    pub fn column(&self) -> &'static str {
        match self {
            UsageCounter::Downloads => "downloads_this_month",
            UsageCounter::AiSuggestions => "ai_suggestions_this_month",
            UsageCounter::AiGenerations => "ai_generations_this_month",
        }
    }
}

/// Snapshot of a user's counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageCounters {
    pub downloads: i32,
    pub ai_suggestions: i32,
    pub ai_generations: i32,
}

impl UsageCounters {
    pub fn get(&self, counter: UsageCounter) -> i32 {
        match counter {
            UsageCounter::Downloads => self.downloads,
            UsageCounter::AiSuggestions => self.ai_suggestions,
            UsageCounter::AiGenerations => self.ai_generations,
        }
    }

    pub fn incremented(&self, counter: UsageCounter) -> UsageCounters {
        let mut next = *self;
        match counter {
            UsageCounter::Downloads => next.downloads += 1,
            UsageCounter::AiSuggestions => next.ai_suggestions += 1,
            UsageCounter::AiGenerations => next.ai_generations += 1,
        }
        next
    }

    /// Usage charged against `quota` for `counter`.
    pub fn used_against(&self, counter: UsageCounter, quota: Quota) -> i32 {
        match quota {
            Quota::Lifetime(_) => self.downloads + self.ai_generations,
            _ => self.get(counter),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// `remaining` is `None` for unlimited and unmetered actions.
    Allowed { remaining: Option<i32> },
    QuotaExceeded { used: i32, limit: i32 },
    NotInTier,
}

/// Pure capability check for `action` given current usage.
pub fn evaluate(tier: Tier, action: Action, usage: &UsageCounters) -> Decision {
    let caps = tier.capabilities();

    let Some(counter) = action.counter() else {
        return if caps.platform_integrations {
            Decision::Allowed { remaining: None }
        } else {
            Decision::NotInTier
        };
    };

    let quota = caps.quota_for(counter);
    match quota {
        Quota::None => Decision::NotInTier,
        Quota::Unlimited => Decision::Allowed { remaining: None },
        Quota::Monthly(limit) | Quota::Lifetime(limit) => {
            let used = usage.used_against(counter, quota);
            if used >= limit {
                Decision::QuotaExceeded { used, limit }
            } else {
                Decision::Allowed { remaining: Some(limit - used) }
            }
        }
    }
}
