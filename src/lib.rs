//! Dynamic cohort rules compiled to SQL.
//!
//! Date rules (`user.timecreated before ...`, `position start date within the
//! past 30 days`, custom-field dates) compile into standalone predicates over
//! the `u` user alias. Predicates of one rule set are ANDed, rule sets are
//! ORed, and the result selects the cohort's members.

pub mod config;
pub mod db;
pub mod error;
pub mod membership;
mod migrations;
pub mod rules;

pub use config::{BindMode, CompilerConfig, Dialect};
pub use error::RuleError;
pub use membership::MembershipEvaluator;
pub use rules::{aggregate, compile, CompiledPredicate, DateField, DateOperator};
