//! Error types for rule compilation and membership evaluation.
//!
//! Errors are classified by where they come from:
//! - Configuration: unknown operator, unknown rule type, bad column or prefix
//! - Data: persisted parameters that don't parse or are out of range
//! - Execution: the database rejected or failed the query

use thiserror::Error;

use crate::db::DbError;

/// Error types for compiling and evaluating cohort rules
#[derive(Debug, Error)]
pub enum RuleError {
    // Configuration errors
    #[error("Unknown date operator code: {0}")]
    UnknownOperator(i64),

    #[error("Unknown rule type '{ruletype}' with name '{name}'")]
    UnknownRuleType { ruletype: String, name: String },

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Data errors
    #[error("Rule parameter '{0}' is missing")]
    MissingParam(String),

    #[error("Rule parameter '{name}' has invalid value '{value}'")]
    InvalidParam { name: String, value: String },

    #[error("Date arithmetic overflowed for a duration of {0} days")]
    DurationOverflow(i64),

    #[error("Cohort {0} not found")]
    CohortNotFound(i64),

    #[error("Cohort {0} is static and has no rules to evaluate")]
    StaticCohort(i64),

    // Execution errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl RuleError {
    /// Returns true if the rule definition or compiler setup is at fault,
    /// as opposed to the stored data or the database.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RuleError::UnknownOperator(_)
                | RuleError::UnknownRuleType { .. }
                | RuleError::InvalidColumn(_)
                | RuleError::Config(_)
        )
    }

    /// Get a recovery suggestion for the administrator
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RuleError::UnknownOperator(_) => "Edit the rule and pick one of the listed date operators.",
            RuleError::UnknownRuleType { .. } => {
                "The rule refers to a field that is no longer available. Remove or replace the rule."
            }
            RuleError::InvalidColumn(_) => "Register the user column before using it in a rule.",
            RuleError::Config(_) => "Check the compiler configuration file.",
            RuleError::MissingParam(_) | RuleError::InvalidParam { .. } => {
                "Edit the rule and save it again to rewrite its parameters."
            }
            RuleError::DurationOverflow(_) => "Use a shorter duration.",
            RuleError::CohortNotFound(_) => "Check the cohort id.",
            RuleError::StaticCohort(_) => "Only dynamic cohorts are recalculated.",
            RuleError::Database(_) => "Check the database is reachable and the schema is current.",
        }
    }
}

impl From<rusqlite::Error> for RuleError {
    fn from(err: rusqlite::Error) -> Self {
        RuleError::Database(DbError::Sqlite(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(RuleError::UnknownOperator(99).is_configuration_error());
        assert!(RuleError::InvalidColumn("x;y".into()).is_configuration_error());
        assert!(!RuleError::MissingParam("date".into()).is_configuration_error());
        assert!(!RuleError::CohortNotFound(4).is_configuration_error());
    }

    #[test]
    fn test_display_messages() {
        let err = RuleError::InvalidParam {
            name: "date".into(),
            value: "soon".into(),
        };
        assert_eq!(err.to_string(), "Rule parameter 'date' has invalid value 'soon'");
        assert_eq!(
            RuleError::UnknownOperator(70).to_string(),
            "Unknown date operator code: 70"
        );
    }

    #[test]
    fn test_sqlite_error_wraps_as_database() {
        let err: RuleError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, RuleError::Database(DbError::Sqlite(_))));
        assert!(!err.recovery_suggestion().is_empty());
    }
}
