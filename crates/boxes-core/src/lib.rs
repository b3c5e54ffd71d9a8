pub mod errors;
pub mod filter;
pub mod ids;
pub mod model;
pub mod policy;
pub mod rules;
pub mod time;

pub use errors::{Forbidden, LimitError, RuleViolation, ValidationError};
pub use filter::{BoxFilter, FilterError, Scope};
pub use ids::{BoxId, UserId};
pub use model::{Actor, BoxPatch, BoxRecord, NewBox, Owner};
pub use rules::{AggregateSource, Rule, RuleChecker, RuleLimits};
