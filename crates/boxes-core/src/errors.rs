/// An aggregate rule that failed after a write committed.
///
/// The write is NOT undone; callers surface this as an error while the
/// record stays created, updated or deleted.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RuleViolation {
    #[error("Average area of all added boxes should not exceed {limit}.")]
    AreaExceeded { limit: f64, observed: f64 },
    #[error("Total boxes added in a week cannot be more than {limit}.")]
    WeeklyTotalExceeded { limit: u32, observed: u64 },
    #[error("Total boxes added in a week by a user cannot be more than {limit}.")]
    WeeklyPerUserExceeded { limit: u32, observed: u64 },
}

impl RuleViolation {
    /// Stable machine-readable code for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AreaExceeded { .. } => "area_exceeded",
            Self::WeeklyTotalExceeded { .. } => "boxes_added_in_week_exceeded",
            Self::WeeklyPerUserExceeded { .. } => "boxes_added_in_week_by_user_exceeded",
        }
    }
}

/// Permission or ownership failure. Always checked before any write.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("You don't have permission to perform this action.")]
pub struct Forbidden;

/// A configured rule limit that cannot be enforced.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LimitError {
    #[error("averageAreaLimit must be a finite non-negative number, got {0}")]
    AverageArea(f64),
}

/// Malformed request payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("{field}: a valid number is required")]
    InvalidNumber { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_messages_reference_limits() {
        let area = RuleViolation::AreaExceeded {
            limit: 100.0,
            observed: 150.0,
        };
        assert_eq!(
            area.to_string(),
            "Average area of all added boxes should not exceed 100."
        );
        let total = RuleViolation::WeeklyTotalExceeded {
            limit: 100,
            observed: 101,
        };
        assert_eq!(
            total.to_string(),
            "Total boxes added in a week cannot be more than 100."
        );
        let per_user = RuleViolation::WeeklyPerUserExceeded {
            limit: 50,
            observed: 51,
        };
        assert_eq!(
            per_user.to_string(),
            "Total boxes added in a week by a user cannot be more than 50."
        );
    }

    #[test]
    fn rule_codes_are_distinct() {
        let codes = [
            RuleViolation::AreaExceeded { limit: 1.0, observed: 2.0 }.code(),
            RuleViolation::WeeklyTotalExceeded { limit: 1, observed: 2 }.code(),
            RuleViolation::WeeklyPerUserExceeded { limit: 1, observed: 2 }.code(),
        ];
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
        assert_ne!(codes[0], codes[2]);
    }

    #[test]
    fn missing_fields_lists_names() {
        let err = ValidationError::MissingFields(vec!["length".into(), "height".into()]);
        assert_eq!(err.to_string(), "missing required fields: length, height");
    }
}
