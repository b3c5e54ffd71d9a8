//! Query filter vocabulary shared by both list operations.
//!
//! Request parameters are parsed once into a typed [`BoxFilter`], which then
//! lowers into a flat list of [`Condition`]s. The store renders conditions to
//! SQL; [`BoxFilter::matches`] evaluates the same list in memory.

use chrono::{DateTime, Utc};

use crate::ids::UserId;
use crate::model::BoxRecord;
use crate::time::parse_lenient;

/// Which base collection a list operation starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    All,
    Owner(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("{param}: a valid number is required, got {value:?}")]
    InvalidNumber { param: &'static str, value: String },
    #[error("{param}: a valid date/time is required, got {value:?}")]
    InvalidTimestamp { param: &'static str, value: String },
}

/// A numeric quantity a range filter can apply to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measure {
    Length,
    Breadth,
    Height,
    Area,
    Volume,
}

impl Measure {
    pub fn of(self, record: &BoxRecord) -> f64 {
        match self {
            Self::Length => record.length,
            Self::Breadth => record.breadth,
            Self::Height => record.height,
            Self::Area => record.area(),
            Self::Volume => record.volume(),
        }
    }

    /// Derived measures only match records whose dimensions are all positive.
    pub fn is_derived(self) -> bool {
        matches!(self, Self::Area | Self::Volume)
    }
}

/// Strict comparison direction of a range filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Above,
    Below,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Range { measure: Measure, bound: Bound, value: f64 },
    PositiveDimensions,
    OwnerUsername(String),
    CreatedFrom(DateTime<Utc>),
    CreatedUntil(DateTime<Utc>),
}

impl Condition {
    pub fn matches(&self, record: &BoxRecord) -> bool {
        match self {
            Self::Range {
                measure,
                bound: Bound::Above,
                value,
            } => measure.of(record) > *value,
            Self::Range {
                measure,
                bound: Bound::Below,
                value,
            } => measure.of(record) < *value,
            Self::PositiveDimensions => {
                record.length > 0.0 && record.breadth > 0.0 && record.height > 0.0
            }
            Self::OwnerUsername(name) => record.owner.username == *name,
            Self::CreatedFrom(ts) => record.created_at >= *ts,
            Self::CreatedUntil(ts) => record.created_at <= *ts,
        }
    }
}

/// Parsed filter parameters. Every field is optional; `None` means no
/// constraint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoxFilter {
    pub length_more_than: Option<f64>,
    pub length_less_than: Option<f64>,
    pub breadth_more_than: Option<f64>,
    pub breadth_less_than: Option<f64>,
    pub height_more_than: Option<f64>,
    pub height_less_than: Option<f64>,
    pub area_more_than: Option<f64>,
    pub area_less_than: Option<f64>,
    pub volume_more_than: Option<f64>,
    pub volume_less_than: Option<f64>,
    pub created_by_username: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
enum Param {
    Range(Measure, Bound),
    CreatedByUsername,
    CreatedAfter,
    CreatedBefore,
}

/// Parameter spellings as (snake_case, camelCase). snake_case wins when a
/// request carries both.
const PARAMS: &[(Param, &str, &str)] = &[
    (Param::Range(Measure::Length, Bound::Above), "length_more_than", "lengthMoreThan"),
    (Param::Range(Measure::Length, Bound::Below), "length_less_than", "lengthLessThan"),
    (Param::Range(Measure::Breadth, Bound::Above), "breadth_more_than", "breadthMoreThan"),
    (Param::Range(Measure::Breadth, Bound::Below), "breadth_less_than", "breadthLessThan"),
    (Param::Range(Measure::Height, Bound::Above), "height_more_than", "heightMoreThan"),
    (Param::Range(Measure::Height, Bound::Below), "height_less_than", "heightLessThan"),
    (Param::Range(Measure::Area, Bound::Above), "area_more_than", "areaMoreThan"),
    (Param::Range(Measure::Area, Bound::Below), "area_less_than", "areaLessThan"),
    (Param::Range(Measure::Volume, Bound::Above), "volume_more_than", "volumeMoreThan"),
    (Param::Range(Measure::Volume, Bound::Below), "volume_less_than", "volumeLessThan"),
    (Param::CreatedByUsername, "created_by_username", "createdByUsername"),
    (Param::CreatedAfter, "created_after", "createdAfter"),
    (Param::CreatedBefore, "created_before", "createdBefore"),
];

impl BoxFilter {
    /// Build a filter from raw query parameters. Unknown keys are ignored. When
    /// a key repeats, its last value is the one used, and an empty value
    /// imposes no constraint.
    pub fn from_params<'a, I>(params: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let params: Vec<(&str, &str)> = params.into_iter().collect();
        let find = |key: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .filter(|v| !v.trim().is_empty())
        };

        let mut filter = Self::default();
        for &(param, snake, camel) in PARAMS {
            let Some(raw) = find(snake).or_else(|| find(camel)) else {
                continue;
            };
            match param {
                Param::Range(measure, bound) => {
                    *filter.range_slot(measure, bound) = Some(number(snake, raw)?);
                }
                Param::CreatedByUsername => filter.created_by_username = Some(raw.to_string()),
                Param::CreatedAfter => filter.created_after = Some(timestamp(snake, raw)?),
                Param::CreatedBefore => filter.created_before = Some(timestamp(snake, raw)?),
            }
        }
        Ok(filter)
    }

    fn range_slot(&mut self, measure: Measure, bound: Bound) -> &mut Option<f64> {
        match (measure, bound) {
            (Measure::Length, Bound::Above) => &mut self.length_more_than,
            (Measure::Length, Bound::Below) => &mut self.length_less_than,
            (Measure::Breadth, Bound::Above) => &mut self.breadth_more_than,
            (Measure::Breadth, Bound::Below) => &mut self.breadth_less_than,
            (Measure::Height, Bound::Above) => &mut self.height_more_than,
            (Measure::Height, Bound::Below) => &mut self.height_less_than,
            (Measure::Area, Bound::Above) => &mut self.area_more_than,
            (Measure::Area, Bound::Below) => &mut self.area_less_than,
            (Measure::Volume, Bound::Above) => &mut self.volume_more_than,
            (Measure::Volume, Bound::Below) => &mut self.volume_less_than,
        }
    }

    /// Lower into a conjunction of conditions.
    pub fn conditions(&self) -> Vec<Condition> {
        let ranges = [
            (Measure::Length, Bound::Above, self.length_more_than),
            (Measure::Length, Bound::Below, self.length_less_than),
            (Measure::Breadth, Bound::Above, self.breadth_more_than),
            (Measure::Breadth, Bound::Below, self.breadth_less_than),
            (Measure::Height, Bound::Above, self.height_more_than),
            (Measure::Height, Bound::Below, self.height_less_than),
            (Measure::Area, Bound::Above, self.area_more_than),
            (Measure::Area, Bound::Below, self.area_less_than),
            (Measure::Volume, Bound::Above, self.volume_more_than),
            (Measure::Volume, Bound::Below, self.volume_less_than),
        ];

        let mut out = Vec::new();
        let mut needs_positive = false;
        for (measure, bound, value) in ranges {
            if let Some(value) = value {
                needs_positive |= measure.is_derived();
                out.push(Condition::Range {
                    measure,
                    bound,
                    value,
                });
            }
        }
        if needs_positive {
            out.push(Condition::PositiveDimensions);
        }
        if let Some(name) = &self.created_by_username {
            out.push(Condition::OwnerUsername(name.clone()));
        }
        if let Some(ts) = self.created_after {
            out.push(Condition::CreatedFrom(ts));
        }
        if let Some(ts) = self.created_before {
            out.push(Condition::CreatedUntil(ts));
        }
        out
    }

    /// In-memory evaluation, equivalent to the SQL the store generates.
    pub fn matches(&self, scope: Scope, record: &BoxRecord) -> bool {
        let in_scope = match scope {
            Scope::All => true,
            Scope::Owner(user) => record.is_owned_by(user),
        };
        in_scope && self.conditions().iter().all(|c| c.matches(record))
    }
}

fn number(param: &'static str, raw: &str) -> Result<f64, FilterError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FilterError::InvalidNumber {
            param,
            value: raw.to_string(),
        })
}

fn timestamp(param: &'static str, raw: &str) -> Result<DateTime<Utc>, FilterError> {
    parse_lenient(raw).ok_or_else(|| FilterError::InvalidTimestamp {
        param,
        value: raw.to_string(),
    })
}
