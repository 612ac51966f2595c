use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::tier::{evaluate, Action, Decision, Quota, Tier, UsageCounters};
use crate::db::{User, UserStore};
use crate::error::{AccessError, AppError, DatabaseError};
use crate::monitoring;
use crate::Result;

/// Attempts at the read/compare-and-swap cycle before giving up on a
/// contended counter.
const MAX_CONSUME_ATTEMPTS: usize = 3;

/// First instant of the UTC calendar month containing `now`.
pub fn period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

/// Turns a [`Decision`] into the error the API reports.
pub fn authorize(tier: Tier, action: Action, usage: &UsageCounters) -> std::result::Result<Option<i32>, AccessError> {
    match evaluate(tier, action, usage) {
        Decision::Allowed { remaining } => Ok(remaining),
        Decision::QuotaExceeded { used, limit } => Err(AccessError::QuotaExceeded { action, tier, used, limit }),
        Decision::NotInTier => Err(AccessError::TierRequired { action, tier }),
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ResetReport {
    pub reset: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionUsage {
    pub action: Action,
    pub included: bool,
    pub used: i32,
    /// `None` when unlimited.
    pub limit: Option<i32>,
    pub remaining: Option<i32>,
    pub lifetime: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub tier: Tier,
    pub period_start: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
    pub usage: Vec<ActionUsage>,
    pub platform_integrations: bool,
    pub priority_support: bool,
}

pub struct QuotaGate {
    users: Arc<dyn UserStore>,
}

impl QuotaGate {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Checks `action` against the user's tier and current counters without
    /// consuming anything. Returns the remaining allowance.
    pub fn check(&self, user: &User, action: Action) -> Result<Option<i32>> {
        let tier = user.tier();
        authorize(tier, action, &user.usage()).map_err(|e| {
            monitoring::record_access_denied(&e);
            AppError::from(e)
        })
    }

    /// Passes when the tier includes `action` at all, whatever the counters say.
    pub fn require_capability(&self, user: &User, action: Action) -> Result<()> {
        let tier = user.tier();
        let included = match action.counter() {
            Some(counter) => tier.capabilities().quota_for(counter) != Quota::None,
            None => tier.capabilities().platform_integrations,
        };

        if included {
            Ok(())
        } else {
            let err = AccessError::TierRequired { action, tier };
            monitoring::record_access_denied(&err);
            Err(err.into())
        }
    }

    pub fn require_integrations(&self, user: &User) -> Result<()> {
        self.check(user, Action::PlatformIntegration).map(|_| ())
    }

    /// Re-reads the user, re-evaluates the quota and increments the counter
    /// for `action` by one. Returns the counters after the increment.
    pub async fn consume(&self, user_id: Uuid, action: Action) -> Result<UsageCounters> {
        for attempt in 1..=MAX_CONSUME_ATTEMPTS {
            let user = self
                .users
                .get_user_by_id(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("User".into()))?;
            let usage = user.usage();

            self.check(&user, action)?;

            let Some(counter) = action.counter() else {
                return Ok(usage);
            };

            if self.users.increment_usage(user_id, counter, &usage).await? {
                debug!(%user_id, action = %action, "Usage consumed");
                return Ok(usage.incremented(counter));
            }

            warn!(%user_id, action = %action, attempt, "Usage counters changed concurrently, retrying");
        }

        Err(DatabaseError::Conflict.into())
    }

    pub fn usage_summary(&self, user: &User, now: DateTime<Utc>) -> UsageSummary {
        let tier = user.tier();
        let caps = tier.capabilities();
        let usage = user.usage();

        let metered = [Action::Download, Action::AiSuggestion, Action::AiGeneration];
        let entries = metered
            .into_iter()
            .filter_map(|action| action.counter().map(|counter| (action, counter)))
            .map(|(action, counter)| {
                let quota = caps.quota_for(counter);
                let used = usage.used_against(counter, quota);
                let (included, limit) = match quota {
                    Quota::None => (false, Some(0)),
                    Quota::Monthly(limit) | Quota::Lifetime(limit) => (true, Some(limit)),
                    Quota::Unlimited => (true, None),
                };
                ActionUsage {
                    action,
                    included,
                    used,
                    limit,
                    remaining: limit.map(|l| (l - used).max(0)),
                    lifetime: matches!(quota, Quota::Lifetime(_)),
                }
            })
            .collect();

        UsageSummary {
            tier,
            period_start: period_start(now),
            last_reset: user.last_usage_reset,
            usage: entries,
            platform_integrations: caps.platform_integrations,
            priority_support: caps.priority_support,
        }
    }

    /// Zeroes the monthly counters of every user not yet reset in the period
    /// containing `now`. Lifetime tiers are skipped. A failure on one user is
    /// logged and counted.
    pub async fn reset_monthly_usage(&self, now: DateTime<Utc>) -> Result<ResetReport> {
        let start = period_start(now);
        let due = self.users.users_due_for_reset(start).await?;
        let mut report = ResetReport::default();

        for user in due {
            if !user.tier().resets_monthly() {
                report.skipped += 1;
                continue;
            }

            match self.users.reset_usage(user.id, start, now).await {
                Ok(true) => report.reset += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "Failed to reset usage");
                    report.failed += 1;
                }
            }
        }

        info!(
            reset = report.reset,
            skipped = report.skipped,
            failed = report.failed,
            period_start = %start,
            "Monthly usage reset finished"
        );
        monitoring::record_usage_reset(&report);

        Ok(report)
    }
}
