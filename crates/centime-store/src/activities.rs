//! The trailing-window activity log.
//!
//! Rows are ranked by `created_at` descending, with the SQLite rowid as the
//! tie-break so same-timestamp rows keep insertion order.  [`Database::trim_activities`]
//! deletes rows strictly older than the Nth-most-recent; rows that share the
//! Nth row's exact timestamp survive, which can transiently leave more than N
//! rows but never discards a just-inserted one.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{ActivityKind, RecentActivity};

impl Database {
    /// Insert a new activity row.
    pub fn insert_activity(&self, activity: &RecentActivity) -> Result<()> {
        self.conn().execute(
            "INSERT INTO recent_activities
                 (id, expense_id, description, category, amount, date, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                activity.id.to_string(),
                activity.expense_id.to_string(),
                activity.description,
                activity.category,
                activity.amount,
                activity.date.format("%Y-%m-%d").to_string(),
                activity.kind.as_str(),
                activity.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List the `limit` most recent activities, newest first.
    pub fn list_recent_activities(&self, limit: u32) -> Result<Vec<RecentActivity>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, expense_id, description, category, amount, date, kind, created_at
             FROM recent_activities
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], row_to_activity)?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(activities)
    }

    /// Number of activity rows.
    pub fn count_activities(&self) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM recent_activities",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete every activity strictly older than the `keep`th-most-recent
    /// row.  Returns the number of rows deleted.
    ///
    /// RFC-3339 UTC timestamps compare correctly as text, so the cut is done
    /// in a single statement.  With `keep` rows or fewer the subquery yields
    /// no cutoff and nothing is deleted.
    pub fn trim_activities(&self, keep: u32) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM recent_activities
             WHERE created_at < (
                 SELECT created_at FROM recent_activities
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1 OFFSET ?1
             )",
            params![keep.saturating_sub(1)],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`RecentActivity`].
fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecentActivity> {
    let id_str: String = row.get(0)?;
    let expense_id_str: String = row.get(1)?;
    let description: String = row.get(2)?;
    let category: String = row.get(3)?;
    let amount: f64 = row.get(4)?;
    let date_str: String = row.get(5)?;
    let kind_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let expense_id = Uuid::parse_str(&expense_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(RecentActivity {
        id,
        expense_id,
        description,
        category,
        amount,
        date,
        kind: ActivityKind::parse(&kind_str),
        created_at,
    })
}
