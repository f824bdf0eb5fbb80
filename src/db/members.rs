use rusqlite::params;

use super::*;

impl CohortDb {
    // =========================================================================
    // Cohort membership
    // =========================================================================

    /// Current member user ids, ascending.
    pub fn get_cohort_member_ids(&self, cohort_id: i64) -> Result<Vec<i64>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT userid FROM mdl_cohort_members WHERE cohortid = ?1 ORDER BY userid",
        )?;
        let rows = stmt.query_map(params![cohort_id], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Add users to a cohort. Users already present are left untouched.
    /// Returns how many rows were inserted.
    pub fn add_cohort_members(
        &self,
        cohort_id: i64,
        user_ids: &[i64],
        timeadded: i64,
    ) -> Result<usize, DbError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO mdl_cohort_members (cohortid, userid, timeadded)
             VALUES (?1, ?2, ?3)",
        )?;
        let mut inserted = 0;
        for user_id in user_ids {
            inserted += stmt.execute(params![cohort_id, user_id, timeadded])?;
        }
        Ok(inserted)
    }

    /// Remove users from a cohort. Returns how many rows were deleted.
    pub fn remove_cohort_members(&self, cohort_id: i64, user_ids: &[i64]) -> Result<usize, DbError> {
        let mut stmt = self.conn.prepare(
            "DELETE FROM mdl_cohort_members WHERE cohortid = ?1 AND userid = ?2",
        )?;
        let mut removed = 0;
        for user_id in user_ids {
            removed += stmt.execute(params![cohort_id, user_id])?;
        }
        Ok(removed)
    }
}
