//! Typed parameters of a date rule, and their persisted `(name, value)` form.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

use super::operator::DateOperator;

pub const PARAM_OPERATOR: &str = "operator";
pub const PARAM_DATE: &str = "date";

/// Operator plus value. `date` is a timestamp for fixed-date operators and a
/// day count for duration operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRuleParams {
    pub operator: DateOperator,
    pub date: i64,
}

impl DateRuleParams {
    pub fn new(operator: DateOperator, date: i64) -> Result<Self, RuleError> {
        let params = Self { operator, date };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), RuleError> {
        if self.operator.is_duration() && self.date < 0 {
            return Err(RuleError::InvalidParam {
                name: PARAM_DATE.to_string(),
                value: self.date.to_string(),
            });
        }
        Ok(())
    }

    /// Build params from persisted rows. Unrelated names are ignored.
    pub fn from_rows<S: AsRef<str>>(rows: &[(S, S)]) -> Result<Self, RuleError> {
        let lookup = |name: &str| -> Result<i64, RuleError> {
            let raw = rows
                .iter()
                .find(|(n, _)| n.as_ref() == name)
                .map(|(_, v)| v.as_ref())
                .ok_or_else(|| RuleError::MissingParam(name.to_string()))?;
            raw.trim().parse::<i64>().map_err(|_| RuleError::InvalidParam {
                name: name.to_string(),
                value: raw.to_string(),
            })
        };

        let operator = DateOperator::from_code(lookup(PARAM_OPERATOR)?)?;
        Self::new(operator, lookup(PARAM_DATE)?)
    }

    /// Rows to persist in `cohort_rule_params`.
    pub fn to_rows(&self) -> Vec<(String, String)> {
        vec![
            (PARAM_OPERATOR.to_string(), self.operator.code().to_string()),
            (PARAM_DATE.to_string(), self.date.to_string()),
        ]
    }

    /// Human-readable summary for rule listings.
    pub fn describe(&self) -> String {
        match self.operator {
            DateOperator::BeforeFixedDate => format!("before {}", format_date(self.date)),
            DateOperator::AfterFixedDate => format!("after {}", format_date(self.date)),
            DateOperator::BeforePastDuration => {
                format!("more than {} ago", plural_days(self.date))
            }
            DateOperator::WithinPastDuration => format!("within the past {}", plural_days(self.date)),
            DateOperator::WithinFutureDuration => format!("within the next {}", plural_days(self.date)),
            DateOperator::AfterFutureDuration => {
                format!("more than {} from now", plural_days(self.date))
            }
        }
    }
}

fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn plural_days(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{} days", days)
    }
}
