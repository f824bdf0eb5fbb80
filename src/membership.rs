//! Cohort membership evaluation: stored rules -> one predicate -> user ids.
//!
//! Predicates are rebuilt on every evaluation since duration rules are
//! anchored to `now`.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::params_from_iter;
use serde::Serialize;

use crate::db::{CohortDb, CohortType, DbRuleset, SyncSummary};
use crate::error::RuleError;
use crate::rules::{aggregate, CompiledPredicate, DateRule, DateRuleParams, FieldRegistry, SqlCompiler};

/// Wall-clock seconds since the epoch. Only the outermost caller should
/// read the clock; everything below takes `now` as an argument.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Result of a batch recalculation over every active dynamic cohort.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub synced: Vec<(i64, SyncSummary)>,
    pub failed: Vec<(i64, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct MembershipEvaluator {
    compiler: SqlCompiler,
    registry: FieldRegistry,
}

impl MembershipEvaluator {
    pub fn new(compiler: SqlCompiler, registry: FieldRegistry) -> Self {
        Self { compiler, registry }
    }

    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    /// Resolve stored rule sets into typed rules, preserving order.
    pub fn resolve_rules(&self, rulesets: &[DbRuleset]) -> Result<Vec<Vec<DateRule>>, RuleError> {
        rulesets
            .iter()
            .map(|ruleset| {
                ruleset
                    .rules
                    .iter()
                    .map(|rule| -> Result<DateRule, RuleError> {
                        Ok(DateRule {
                            field: self.registry.resolve(&rule.ruletype, &rule.name)?,
                            params: DateRuleParams::from_rows(&rule.params)?,
                        })
                    })
                    .collect::<Result<Vec<_>, RuleError>>()
            })
            .collect()
    }

    /// Compile every rule of the cohort and combine them.
    pub fn build_cohort_predicate(
        &self,
        db: &CohortDb,
        cohort_id: i64,
        now: i64,
    ) -> Result<CompiledPredicate, RuleError> {
        if db.get_cohort(cohort_id)?.is_none() {
            return Err(RuleError::CohortNotFound(cohort_id));
        }

        let rulesets = db.load_cohort_rules(cohort_id)?;
        let rules = self.resolve_rules(&rulesets)?;

        let compiled = rules
            .iter()
            .map(|ruleset| {
                ruleset
                    .iter()
                    .map(|rule| self.compiler.compile_rule(rule, now))
                    .collect::<Result<Vec<_>, RuleError>>()
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        Ok(aggregate(compiled))
    }

    /// Ids of non-deleted users satisfying `predicate`, ascending.
    pub fn matching_user_ids(
        &self,
        db: &CohortDb,
        predicate: &CompiledPredicate,
    ) -> Result<Vec<i64>, RuleError> {
        let config = self.compiler.config();
        let sql = format!(
            "SELECT u.id FROM {} u WHERE u.deleted = 0 AND {} ORDER BY u.id",
            config.table("user"),
            predicate.render(config.dialect)
        );
        let mut stmt = db.conn_ref().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(predicate.params.iter()), |row| {
            row.get::<_, i64>(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Number of users a cohort's rules currently match, for rule previews.
    pub fn count_matching_users(
        &self,
        db: &CohortDb,
        cohort_id: i64,
        now: i64,
    ) -> Result<i64, RuleError> {
        let predicate = self.build_cohort_predicate(db, cohort_id, now)?;
        let config = self.compiler.config();
        let sql = format!(
            "SELECT COUNT(*) FROM {} u WHERE u.deleted = 0 AND {}",
            config.table("user"),
            predicate.render(config.dialect)
        );
        let count = db.conn_ref().query_row(
            &sql,
            params_from_iter(predicate.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Bring a dynamic cohort's member table in line with its rules.
    pub fn sync_cohort_members(
        &self,
        db: &CohortDb,
        cohort_id: i64,
        now: i64,
    ) -> Result<SyncSummary, RuleError> {
        let cohort = db
            .get_cohort(cohort_id)?
            .ok_or(RuleError::CohortNotFound(cohort_id))?;
        if cohort.cohort_type != CohortType::Dynamic {
            return Err(RuleError::StaticCohort(cohort_id));
        }

        // Rules, users and members are all read under the write lock so the
        // diff matches what gets written.
        let (summary, members) = db.with_transaction(|tx| -> Result<_, RuleError> {
            let predicate = self.build_cohort_predicate(tx, cohort_id, now)?;
            let wanted: BTreeSet<i64> =
                self.matching_user_ids(tx, &predicate)?.into_iter().collect();
            let current: BTreeSet<i64> =
                tx.get_cohort_member_ids(cohort_id)?.into_iter().collect();

            let to_add: Vec<i64> = wanted.difference(&current).copied().collect();
            let to_remove: Vec<i64> = current.difference(&wanted).copied().collect();

            let summary = SyncSummary {
                added: tx.add_cohort_members(cohort_id, &to_add, now)?,
                removed: tx.remove_cohort_members(cohort_id, &to_remove)?,
            };
            Ok((summary, wanted.len()))
        })?;

        log::info!(
            "Cohort {} ({}): {} added, {} removed, {} members",
            cohort_id,
            cohort.name,
            summary.added,
            summary.removed,
            members
        );
        Ok(summary)
    }

    /// Recalculate every active dynamic cohort. A cohort that fails is
    /// logged and skipped; the others still run.
    pub fn sync_all_dynamic_cohorts(&self, db: &CohortDb, now: i64) -> Result<BatchReport, RuleError> {
        let mut report = BatchReport::default();
        for cohort in db.list_active_dynamic_cohorts()? {
            match self.sync_cohort_members(db, cohort.id, now) {
                Ok(summary) => report.synced.push((cohort.id, summary)),
                Err(e) => {
                    log::warn!("Skipping cohort {} ({}): {}", cohort.id, cohort.name, e);
                    report.failed.push((cohort.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
