//! Date operators for cohort rules.
//!
//! Each variant carries its persisted code, its display key and the rule for
//! turning a value (timestamp or day count) into comparison bounds.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOperator {
    BeforeFixedDate,
    AfterFixedDate,
    BeforePastDuration,
    WithinPastDuration,
    WithinFutureDuration,
    AfterFutureDuration,
}

/// Resolved bounds of a date comparison, in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    AtMost(i64),
    AtLeast(i64),
    Between(i64, i64),
}

impl DateOperator {
    pub const ALL: [DateOperator; 6] = [
        DateOperator::BeforeFixedDate,
        DateOperator::AfterFixedDate,
        DateOperator::BeforePastDuration,
        DateOperator::WithinPastDuration,
        DateOperator::WithinFutureDuration,
        DateOperator::AfterFutureDuration,
    ];

    /// Integer code stored in `cohort_rule_params`.
    pub fn code(&self) -> i64 {
        match self {
            DateOperator::BeforeFixedDate => 10,
            DateOperator::AfterFixedDate => 20,
            DateOperator::BeforePastDuration => 30,
            DateOperator::WithinPastDuration => 40,
            DateOperator::WithinFutureDuration => 50,
            DateOperator::AfterFutureDuration => 60,
        }
    }

    /// Parse a stored code. Unknown codes are rejected rather than guessed.
    pub fn from_code(code: i64) -> Result<Self, RuleError> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or(RuleError::UnknownOperator(code))
    }

    /// Key of the label shown next to the operator in the rule editor.
    pub fn display_key(&self) -> &'static str {
        match self {
            DateOperator::BeforeFixedDate => "before",
            DateOperator::AfterFixedDate => "after",
            DateOperator::BeforePastDuration => "beforepastduration",
            DateOperator::WithinPastDuration => "inpastduration",
            DateOperator::WithinFutureDuration => "infutureduration",
            DateOperator::AfterFutureDuration => "afterfutureduration",
        }
    }

    /// True when the value is a day count relative to `now`, false when it
    /// is an absolute timestamp.
    pub fn is_duration(&self) -> bool {
        !matches!(
            self,
            DateOperator::BeforeFixedDate | DateOperator::AfterFixedDate
        )
    }

    /// Resolve the comparison bounds for `value` at time `now`.
    pub fn comparison(&self, value: i64, now: i64) -> Result<Comparison, RuleError> {
        let past = || offset(now, value, |n, s| n.checked_sub(s));
        let future = || offset(now, value, |n, s| n.checked_add(s));

        Ok(match self {
            DateOperator::BeforeFixedDate => Comparison::AtMost(value),
            DateOperator::AfterFixedDate => Comparison::AtLeast(value),
            DateOperator::BeforePastDuration => Comparison::AtMost(past()?),
            DateOperator::WithinPastDuration => Comparison::Between(past()?, now),
            DateOperator::WithinFutureDuration => Comparison::Between(now, future()?),
            DateOperator::AfterFutureDuration => Comparison::AtLeast(future()?),
        })
    }
}

fn offset(
    now: i64,
    days: i64,
    apply: impl Fn(i64, i64) -> Option<i64>,
) -> Result<i64, RuleError> {
    days.checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| apply(now, secs))
        .ok_or(RuleError::DurationOverflow(days))
}
