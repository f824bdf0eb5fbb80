//! Compiler configuration: table prefix, SQL dialect and bind mode.
//!
//! Loaded from a JSON file by the batch binary; library callers usually
//! start from `CompilerConfig::default()`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Table prefix used by the bundled SQLite schema.
pub const DEFAULT_TABLE_PREFIX: &str = "mdl_";

/// Value of `pos_assignment.type` marking a user's primary assignment.
pub const POSITION_TYPE_PRIMARY: i64 = 1;

/// Target database flavour. Drives the char-to-int cast and placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
    Mssql,
}

impl Dialect {
    /// Cast a text column holding digits to an integer expression.
    pub fn cast_char_to_int(&self, expr: &str) -> String {
        match self {
            Dialect::Sqlite => format!("CAST({} AS INTEGER)", expr),
            Dialect::Postgres | Dialect::Mssql => format!("CAST({} AS BIGINT)", expr),
            Dialect::Mysql => format!("CAST({} AS SIGNED)", expr),
        }
    }

    /// Whether placeholders are numbered (`$1`, `$2`, ...) instead of `?`.
    pub fn numbered_placeholders(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// How integer operands reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Every integer becomes a `?` placeholder with a bound parameter.
    #[default]
    Bound,
    /// Integers are written into the SQL text; no parameters are produced.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    pub table_prefix: String,
    pub dialect: Dialect,
    pub bind_mode: BindMode,
    pub primary_assignment_type: i64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            dialect: Dialect::default(),
            bind_mode: BindMode::default(),
            primary_assignment_type: POSITION_TYPE_PRIMARY,
        }
    }
}

impl CompilerConfig {
    /// Prefixed table name, e.g. `mdl_user_info_data`.
    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name)
    }
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_]*$").expect("valid prefix regex"))
}

/// Load a config from a JSON file. Missing keys fall back to defaults.
pub fn load_config(path: &std::path::Path) -> Result<CompilerConfig, RuleError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RuleError::Config(format!("Failed to read config file: {}", e)))?;
    let config: CompilerConfig = serde_json::from_str(&content)
        .map_err(|e| RuleError::Config(format!("Failed to parse config: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate values that end up spliced into SQL text.
pub fn validate_config(config: &CompilerConfig) -> Result<(), RuleError> {
    if !prefix_pattern().is_match(&config.table_prefix) {
        return Err(RuleError::Config(format!(
            "Invalid table prefix: {}",
            config.table_prefix
        )));
    }
    if config.primary_assignment_type <= 0 {
        return Err(RuleError::Config(format!(
            "Invalid primary assignment type: {}",
            config.primary_assignment_type
        )));
    }
    Ok(())
}
