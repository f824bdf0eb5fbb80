//! Compiled SQL fragments and the builder that produces them.

use serde::{Deserialize, Serialize};

use crate::config::{BindMode, Dialect};

use super::operator::Comparison;

/// A standalone boolean SQL expression over the `u` user alias plus the
/// integers bound to its `?` placeholders, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPredicate {
    pub sql: String,
    pub params: Vec<i64>,
}

impl CompiledPredicate {
    /// A predicate no row satisfies.
    pub fn match_nothing() -> Self {
        Self {
            sql: "1=0".to_string(),
            params: Vec::new(),
        }
    }

    /// SQL text with placeholders rewritten for `dialect`.
    ///
    /// Fragments never contain a literal `?` outside placeholders, so the
    /// rewrite is a plain scan.
    pub fn render(&self, dialect: Dialect) -> String {
        if !dialect.numbered_placeholders() {
            return self.sql.clone();
        }
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 2);
        let mut n = 0;
        for c in self.sql.chars() {
            if c == '?' {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            } else {
                out.push(c);
            }
        }
        out
    }
}

/// Appends SQL text and integer operands according to the bind mode.
pub(crate) struct SqlBuilder {
    mode: BindMode,
    sql: String,
    params: Vec<i64>,
}

impl SqlBuilder {
    pub(crate) fn new(mode: BindMode) -> Self {
        Self {
            mode,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub(crate) fn push_int(&mut self, value: i64) -> &mut Self {
        match self.mode {
            BindMode::Bound => {
                self.sql.push('?');
                self.params.push(value);
            }
            BindMode::Inline => self.sql.push_str(&value.to_string()),
        }
        self
    }

    pub(crate) fn push_comparison(&mut self, comparison: Comparison) -> &mut Self {
        match comparison {
            Comparison::AtMost(v) => self.push("<= ").push_int(v),
            Comparison::AtLeast(v) => self.push(">= ").push_int(v),
            Comparison::Between(lo, hi) => self.push("BETWEEN ").push_int(lo).push(" AND ").push_int(hi),
        }
    }

    pub(crate) fn finish(self) -> CompiledPredicate {
        CompiledPredicate {
            sql: self.sql,
            params: self.params,
        }
    }
}
