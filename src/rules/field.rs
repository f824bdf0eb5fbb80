//! Date fields a rule can target, and the registry that resolves persisted
//! `(ruletype, name)` pairs to them.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// The field a date rule compares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum DateField {
    /// A timestamp column on the user table.
    UserColumn(String),
    /// A user profile custom field holding a timestamp.
    UserCustomField(i64),
    /// When the user's primary position was assigned.
    PositionAssignmentDate,
    /// A custom field on the type of the user's primary position.
    PositionCustomField(i64),
    /// A custom field on the type of the user's primary organisation.
    OrganisationCustomField(i64),
}

pub(crate) fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"))
}

fn custom_field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^customfield([0-9]+)(?:_[0-9]+)?$").expect("valid custom field regex")
    })
}

/// Default timestamp columns of the user table available to rules.
const DEFAULT_USER_COLUMNS: &[&str] = &[
    "timecreated",
    "timemodified",
    "firstaccess",
    "lastaccess",
    "lastlogin",
    "currentlogin",
];

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    user_columns: BTreeSet<String>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self {
            user_columns: DEFAULT_USER_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl FieldRegistry {
    /// Make another user-table column usable in `user` rules.
    pub fn register_user_column(&mut self, column: &str) -> Result<(), RuleError> {
        if !identifier_pattern().is_match(column) {
            return Err(RuleError::InvalidColumn(column.to_string()));
        }
        self.user_columns.insert(column.to_string());
        Ok(())
    }

    /// Columns selectable in `user` rules, sorted.
    pub fn user_columns(&self) -> impl Iterator<Item = &str> {
        self.user_columns.iter().map(String::as_str)
    }

    /// Resolve a persisted rule identity to the field it targets.
    pub fn resolve(&self, ruletype: &str, name: &str) -> Result<DateField, RuleError> {
        let unknown = || RuleError::UnknownRuleType {
            ruletype: ruletype.to_string(),
            name: name.to_string(),
        };

        match ruletype {
            "user" if self.user_columns.contains(name) => {
                Ok(DateField::UserColumn(name.to_string()))
            }
            "pos" if name == "startdate" => Ok(DateField::PositionAssignmentDate),
            "usercustomfields" => parse_custom_field_id(name)
                .map(DateField::UserCustomField)
                .ok_or_else(unknown),
            "poscustomfields" => parse_custom_field_id(name)
                .map(DateField::PositionCustomField)
                .ok_or_else(unknown),
            "orgcustomfields" => parse_custom_field_id(name)
                .map(DateField::OrganisationCustomField)
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }
}

/// `customfield12` or `customfield12_0` -> 12
fn parse_custom_field_id(name: &str) -> Option<i64> {
    custom_field_pattern()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
