//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// How a cohort's membership is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortType {
    /// Members are added by hand.
    Static,
    /// Members are whoever matches the cohort's rules.
    Dynamic,
}

impl CohortType {
    /// Integer stored in `mdl_cohort.cohorttype`.
    pub fn code(&self) -> i64 {
        match self {
            CohortType::Static => 1,
            CohortType::Dynamic => 2,
        }
    }

    /// Parse from SQL; anything unrecognised is treated as static so it is
    /// never recalculated.
    pub fn from_code_lossy(code: i64) -> Self {
        match code {
            2 => CohortType::Dynamic,
            _ => CohortType::Static,
        }
    }
}

/// A row from the `mdl_cohort` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCohort {
    pub id: i64,
    pub name: String,
    pub idnumber: Option<String>,
    pub cohort_type: CohortType,
    pub active: bool,
}

/// A row from `mdl_cohort_rules` with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRule {
    pub id: i64,
    pub ruleset_id: i64,
    pub ruletype: String,
    pub name: String,
    pub sortorder: i64,
    /// `(name, value)` rows from `mdl_cohort_rule_params`.
    pub params: Vec<(String, String)>,
}

/// A row from `mdl_cohort_rulesets` with its rules in sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRuleset {
    pub id: i64,
    pub cohort_id: i64,
    pub name: String,
    pub sortorder: i64,
    pub rules: Vec<DbRule>,
}

/// Outcome of recalculating one cohort's membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub added: usize,
    pub removed: usize,
}
