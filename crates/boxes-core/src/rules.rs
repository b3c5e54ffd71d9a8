//! Aggregate business rules evaluated after a mutation has committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LimitError, RuleViolation};
use crate::ids::UserId;
use crate::time::week_start;

/// Thresholds for the aggregate rules. Injected into [`RuleChecker`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleLimits {
    /// Ceiling for the average of `length * breadth * height` over all boxes.
    pub average_area_limit: f64,
    /// Ceiling for boxes created by everyone in the weekly window.
    pub weekly_total_limit: u32,
    /// Ceiling for boxes created by one user in the weekly window.
    pub weekly_per_user_limit: u32,
}

impl Default for RuleLimits {
    fn default() -> Self {
        Self {
            average_area_limit: 100.0,
            weekly_total_limit: 100,
            weekly_per_user_limit: 50,
        }
    }
}

impl RuleLimits {
    pub fn validate(&self) -> Result<(), LimitError> {
        if !self.average_area_limit.is_finite() || self.average_area_limit < 0.0 {
            return Err(LimitError::AverageArea(self.average_area_limit));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    AverageArea,
    WeeklyTotal,
    WeeklyPerUser,
}

impl Rule {
    /// Rules checked after a create, in evaluation order.
    pub const AFTER_ADD: &'static [Rule] = &[Rule::AverageArea, Rule::WeeklyTotal, Rule::WeeklyPerUser];
    /// Rules checked after an update.
    pub const AFTER_UPDATE: &'static [Rule] = &[Rule::AverageArea];
    /// Rules checked after a delete, in evaluation order.
    pub const AFTER_DELETE: &'static [Rule] = &[Rule::AverageArea, Rule::WeeklyPerUser];
}

/// Aggregate statistics over the full box collection.
pub trait AggregateSource {
    type Error;

    /// Mean of `length * breadth * height` over all boxes, `None` when empty.
    fn average_volume(&self) -> Result<Option<f64>, Self::Error>;

    /// Boxes with `created_at >= since`, optionally restricted to one owner.
    fn count_created_since(
        &self,
        since: DateTime<Utc>,
        owner: Option<UserId>,
    ) -> Result<u64, Self::Error>;
}

#[derive(Clone, Debug)]
pub struct RuleChecker {
    limits: RuleLimits,
}

impl RuleChecker {
    pub fn new(limits: RuleLimits) -> Self {
        Self { limits }
    }

    /// Evaluate `rules` in order against the current state of `source` and
    /// return the first violation. Stops at the first failure.
    ///
    /// The outer `Result` carries failures of the source itself.
    pub fn check<S: AggregateSource>(
        &self,
        source: &S,
        rules: &[Rule],
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RuleViolation>, S::Error> {
        let since = week_start(now);
        for rule in rules {
            let violation = match rule {
                Rule::AverageArea => source.average_volume()?.and_then(|avg| {
                    (avg > self.limits.average_area_limit).then_some(RuleViolation::AreaExceeded {
                        limit: self.limits.average_area_limit,
                        observed: avg,
                    })
                }),
                Rule::WeeklyTotal => {
                    let count = source.count_created_since(since, None)?;
                    (count > u64::from(self.limits.weekly_total_limit)).then_some(
                        RuleViolation::WeeklyTotalExceeded {
                            limit: self.limits.weekly_total_limit,
                            observed: count,
                        },
                    )
                }
                Rule::WeeklyPerUser => {
                    let count = source.count_created_since(since, Some(actor))?;
                    (count > u64::from(self.limits.weekly_per_user_limit)).then_some(
                        RuleViolation::WeeklyPerUserExceeded {
                            limit: self.limits.weekly_per_user_limit,
                            observed: count,
                        },
                    )
                }
            };
            if violation.is_some() {
                return Ok(violation);
            }
        }
        Ok(None)
    }
}
