//! Dynamic cohort date rules: parameters, field resolution, SQL compilation
//! and rule-set aggregation.

pub mod aggregate;
pub mod field;
pub mod operator;
pub mod params;
pub mod predicate;
pub mod sqlhandler;

pub use aggregate::aggregate;
pub use field::{DateField, FieldRegistry};
pub use operator::{Comparison, DateOperator, SECONDS_PER_DAY};
pub use params::DateRuleParams;
pub use predicate::CompiledPredicate;
pub use sqlhandler::{compile, DateRule, SqlCompiler};
