use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::*;

impl CohortDb {
    // =========================================================================
    // Cohorts
    // =========================================================================

    pub fn create_cohort(
        &self,
        name: &str,
        idnumber: Option<&str>,
        cohort_type: CohortType,
    ) -> Result<i64, DbError> {
        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO mdl_cohort (name, idnumber, cohorttype, active, timecreated, timemodified)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![name, idnumber, cohort_type.code(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn map_cohort_row(row: &rusqlite::Row) -> rusqlite::Result<DbCohort> {
        Ok(DbCohort {
            id: row.get(0)?,
            name: row.get(1)?,
            idnumber: row.get(2)?,
            cohort_type: CohortType::from_code_lossy(row.get(3)?),
            active: row.get::<_, i64>(4)? != 0,
        })
    }

    pub fn get_cohort(&self, id: i64) -> Result<Option<DbCohort>, DbError> {
        let cohort = self
            .conn
            .query_row(
                "SELECT id, name, idnumber, cohorttype, active FROM mdl_cohort WHERE id = ?1",
                params![id],
                Self::map_cohort_row,
            )
            .optional()?;
        Ok(cohort)
    }

    /// Active dynamic cohorts, in id order. These are the ones the nightly
    /// recalculation visits.
    pub fn list_active_dynamic_cohorts(&self) -> Result<Vec<DbCohort>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, idnumber, cohorttype, active FROM mdl_cohort
             WHERE cohorttype = ?1 AND active = 1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![CohortType::Dynamic.code()], Self::map_cohort_row)?;
        let mut cohorts = Vec::new();
        for row in rows {
            cohorts.push(row?);
        }
        Ok(cohorts)
    }

    pub fn set_cohort_active(&self, id: i64, active: bool) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE mdl_cohort SET active = ?1, timemodified = ?2 WHERE id = ?3",
            params![active as i64, Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Rule sets and rules
    // =========================================================================

    /// Append a rule set to the cohort.
    pub fn add_ruleset(&self, cohort_id: i64, name: &str) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO mdl_cohort_rulesets (cohortid, name, sortorder)
             SELECT ?1, ?2, COALESCE(MAX(sortorder), -1) + 1
             FROM mdl_cohort_rulesets WHERE cohortid = ?1",
            params![cohort_id, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append a rule with its parameters to a rule set. The rule and its
    /// parameters are written together or not at all.
    pub fn add_rule(
        &self,
        ruleset_id: i64,
        ruletype: &str,
        name: &str,
        rule_params: &[(String, String)],
    ) -> Result<i64, DbError> {
        self.with_transaction(|tx| -> Result<i64, DbError> {
            tx.conn.execute(
                "INSERT INTO mdl_cohort_rules (rulesetid, ruletype, name, sortorder)
                 SELECT ?1, ?2, ?3, COALESCE(MAX(sortorder), -1) + 1
                 FROM mdl_cohort_rules WHERE rulesetid = ?1",
                params![ruleset_id, ruletype, name],
            )?;
            let rule_id = tx.conn.last_insert_rowid();
            tx.insert_rule_params(rule_id, rule_params)?;
            Ok(rule_id)
        })
    }

    /// Replace all parameters of a rule.
    pub fn set_rule_params(
        &self,
        rule_id: i64,
        rule_params: &[(String, String)],
    ) -> Result<(), DbError> {
        self.with_transaction(|tx| -> Result<(), DbError> {
            tx.conn.execute(
                "DELETE FROM mdl_cohort_rule_params WHERE ruleid = ?1",
                params![rule_id],
            )?;
            tx.insert_rule_params(rule_id, rule_params)
        })
    }

    fn insert_rule_params(
        &self,
        rule_id: i64,
        rule_params: &[(String, String)],
    ) -> Result<(), DbError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO mdl_cohort_rule_params (ruleid, name, value) VALUES (?1, ?2, ?3)",
        )?;
        for (name, value) in rule_params {
            stmt.execute(params![rule_id, name, value])?;
        }
        Ok(())
    }

    pub fn delete_rule(&self, rule_id: i64) -> Result<(), DbError> {
        self.with_transaction(|tx| -> Result<(), DbError> {
            tx.conn.execute(
                "DELETE FROM mdl_cohort_rule_params WHERE ruleid = ?1",
                params![rule_id],
            )?;
            tx.conn
                .execute("DELETE FROM mdl_cohort_rules WHERE id = ?1", params![rule_id])?;
            Ok(())
        })
    }

    pub fn delete_ruleset(&self, ruleset_id: i64) -> Result<(), DbError> {
        self.with_transaction(|tx| -> Result<(), DbError> {
            tx.conn.execute(
                "DELETE FROM mdl_cohort_rule_params WHERE ruleid IN
                 (SELECT id FROM mdl_cohort_rules WHERE rulesetid = ?1)",
                params![ruleset_id],
            )?;
            tx.conn.execute(
                "DELETE FROM mdl_cohort_rules WHERE rulesetid = ?1",
                params![ruleset_id],
            )?;
            tx.conn.execute(
                "DELETE FROM mdl_cohort_rulesets WHERE id = ?1",
                params![ruleset_id],
            )?;
            Ok(())
        })
    }

    /// Load a cohort's rule sets, each with its rules and their parameters,
    /// in sort order.
    pub fn load_cohort_rules(&self, cohort_id: i64) -> Result<Vec<DbRuleset>, DbError> {
        let mut rulesets: Vec<DbRuleset> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, cohortid, name, sortorder FROM mdl_cohort_rulesets
                 WHERE cohortid = ?1
                 ORDER BY sortorder, id",
            )?;
            let rows = stmt.query_map(params![cohort_id], |row| {
                Ok(DbRuleset {
                    id: row.get(0)?,
                    cohort_id: row.get(1)?,
                    name: row.get(2)?,
                    sortorder: row.get(3)?,
                    rules: Vec::new(),
                })
            })?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            items
        };

        let mut rule_stmt = self.conn.prepare(
            "SELECT id, rulesetid, ruletype, name, sortorder FROM mdl_cohort_rules
             WHERE rulesetid = ?1
             ORDER BY sortorder, id",
        )?;
        let mut param_stmt = self.conn.prepare(
            "SELECT name, value FROM mdl_cohort_rule_params WHERE ruleid = ?1 ORDER BY id",
        )?;

        for ruleset in &mut rulesets {
            let rules = rule_stmt.query_map(params![ruleset.id], |row| {
                Ok(DbRule {
                    id: row.get(0)?,
                    ruleset_id: row.get(1)?,
                    ruletype: row.get(2)?,
                    name: row.get(3)?,
                    sortorder: row.get(4)?,
                    params: Vec::new(),
                })
            })?;
            for rule in rules {
                ruleset.rules.push(rule?);
            }

            for rule in &mut ruleset.rules {
                let rows = param_stmt.query_map(params![rule.id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    rule.params.push(row?);
                }
            }
        }

        Ok(rulesets)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    fn date_params(op: &str, date: &str) -> Vec<(String, String)> {
        vec![
            ("operator".to_string(), op.to_string()),
            ("date".to_string(), date.to_string()),
        ]
    }

    #[test]
    fn test_create_and_get_cohort() {
        let db = test_db();
        let id = db
            .create_cohort("New starters", Some("NS1"), CohortType::Dynamic)
            .unwrap();
        let cohort = db.get_cohort(id).unwrap().expect("cohort exists");
        assert_eq!(cohort.name, "New starters");
        assert_eq!(cohort.idnumber.as_deref(), Some("NS1"));
        assert_eq!(cohort.cohort_type, CohortType::Dynamic);
        assert!(cohort.active);
        assert!(db.get_cohort(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_list_active_dynamic_cohorts() {
        let db = test_db();
        let a = db.create_cohort("A", None, CohortType::Dynamic).unwrap();
        let _static = db.create_cohort("B", None, CohortType::Static).unwrap();
        let c = db.create_cohort("C", None, CohortType::Dynamic).unwrap();
        db.set_cohort_active(c, false).unwrap();

        let ids: Vec<i64> = db
            .list_active_dynamic_cohorts()
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![a]);
    }

    #[test]
    fn test_load_cohort_rules_in_order() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let first = db.add_ruleset(cohort, "first").unwrap();
        let second = db.add_ruleset(cohort, "second").unwrap();

        db.add_rule(first, "user", "timecreated", &date_params("10", "1000"))
            .unwrap();
        db.add_rule(first, "pos", "startdate", &date_params("40", "30"))
            .unwrap();
        db.add_rule(second, "usercustomfields", "customfield4_0", &date_params("20", "5"))
            .unwrap();

        let rulesets = db.load_cohort_rules(cohort).unwrap();
        assert_eq!(rulesets.len(), 2);
        assert_eq!(rulesets[0].id, first);
        assert_eq!(rulesets[0].sortorder, 0);
        assert_eq!(rulesets[1].sortorder, 1);
        assert_eq!(rulesets[0].rules.len(), 2);
        assert_eq!(rulesets[0].rules[0].name, "timecreated");
        assert_eq!(rulesets[0].rules[1].ruletype, "pos");
        assert_eq!(rulesets[0].rules[1].sortorder, 1);
        assert_eq!(rulesets[1].rules[0].params, date_params("20", "5"));
    }

    #[test]
    fn test_set_rule_params_replaces() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let rs = db.add_ruleset(cohort, "").unwrap();
        let rule = db
            .add_rule(rs, "user", "lastaccess", &date_params("40", "7"))
            .unwrap();
        db.set_rule_params(rule, &date_params("30", "90")).unwrap();

        let rulesets = db.load_cohort_rules(cohort).unwrap();
        assert_eq!(rulesets[0].rules[0].params, date_params("30", "90"));
    }

    #[test]
    fn test_delete_rule_and_ruleset() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let rs1 = db.add_ruleset(cohort, "").unwrap();
        let rs2 = db.add_ruleset(cohort, "").unwrap();
        let r1 = db.add_rule(rs1, "user", "lastaccess", &date_params("40", "7")).unwrap();
        db.add_rule(rs1, "user", "firstaccess", &date_params("40", "7")).unwrap();
        db.add_rule(rs2, "user", "lastlogin", &date_params("40", "7")).unwrap();

        db.delete_rule(r1).unwrap();
        db.delete_ruleset(rs2).unwrap();

        let rulesets = db.load_cohort_rules(cohort).unwrap();
        assert_eq!(rulesets.len(), 1);
        assert_eq!(rulesets[0].rules.len(), 1);
        assert_eq!(rulesets[0].rules[0].name, "firstaccess");

        let orphans: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM mdl_cohort_rule_params", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 2, "only the surviving rule's params remain");
    }

    fn count(db: &CohortDb, table: &str) -> i64 {
        db.conn_ref()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_add_rule_with_bad_params_leaves_nothing_behind() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let rs = db.add_ruleset(cohort, "").unwrap();
        db.conn_ref()
            .execute_batch(
                "CREATE TRIGGER reject_bad_param BEFORE INSERT ON mdl_cohort_rule_params
                 WHEN NEW.name = 'date' AND NEW.value = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = db.add_rule(rs, "user", "lastaccess", &date_params("40", "bad"));
        assert!(result.is_err());
        assert_eq!(count(&db, "mdl_cohort_rules"), 0, "rule row must roll back");
        assert_eq!(count(&db, "mdl_cohort_rule_params"), 0);

        db.add_rule(rs, "user", "lastaccess", &date_params("40", "7")).unwrap();
        assert_eq!(count(&db, "mdl_cohort_rules"), 1);
    }

    #[test]
    fn test_set_rule_params_failure_keeps_old_params() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let rs = db.add_ruleset(cohort, "").unwrap();
        let rule = db
            .add_rule(rs, "user", "lastaccess", &date_params("40", "7"))
            .unwrap();
        db.conn_ref()
            .execute_batch(
                "CREATE TRIGGER reject_bad_param BEFORE INSERT ON mdl_cohort_rule_params
                 WHEN NEW.value = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(db.set_rule_params(rule, &date_params("30", "bad")).is_err());
        let rulesets = db.load_cohort_rules(cohort).unwrap();
        assert_eq!(rulesets[0].rules[0].params, date_params("40", "7"));
    }

    #[test]
    fn test_delete_ruleset_failure_rolls_back() {
        let db = test_db();
        let cohort = db.create_cohort("Audience", None, CohortType::Dynamic).unwrap();
        let rs = db.add_ruleset(cohort, "").unwrap();
        db.add_rule(rs, "user", "lastaccess", &date_params("40", "7")).unwrap();
        db.conn_ref()
            .execute_batch(
                "CREATE TRIGGER keep_rulesets BEFORE DELETE ON mdl_cohort_rulesets
                 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();

        assert!(db.delete_ruleset(rs).is_err());
        assert_eq!(count(&db, "mdl_cohort_rules"), 1);
        assert_eq!(count(&db, "mdl_cohort_rule_params"), 2);
    }
}
