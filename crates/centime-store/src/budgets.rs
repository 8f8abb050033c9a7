//! CRUD operations for [`Budget`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Budget, Timeframe};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new budget.  Fails if a budget already exists for the
    /// category (UNIQUE constraint).
    pub fn insert_budget(&self, budget: &Budget) -> Result<()> {
        self.conn().execute(
            "INSERT INTO budgets (id, category, amount, spent, timeframe, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                budget.id.to_string(),
                budget.category,
                budget.amount,
                budget.spent,
                budget.timeframe.as_str(),
                budget.created_at.to_rfc3339(),
                budget.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single budget by UUID.
    pub fn get_budget(&self, id: Uuid) -> Result<Budget> {
        self.conn()
            .query_row(
                "SELECT id, category, amount, spent, timeframe, created_at, updated_at
                 FROM budgets WHERE id = ?1",
                params![id.to_string()],
                row_to_budget,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the budget for a category, if one exists.
    ///
    /// A category may have expenses but no budget, so a missing row is a
    /// normal outcome here, not an error.
    pub fn get_budget_for_category(&self, category: &str) -> Result<Option<Budget>> {
        let budget = self
            .conn()
            .query_row(
                "SELECT id, category, amount, spent, timeframe, created_at, updated_at
                 FROM budgets WHERE category = ?1",
                params![category],
                row_to_budget,
            )
            .optional()?;
        Ok(budget)
    }

    /// List all budgets, ordered by category name.
    pub fn list_budgets(&self) -> Result<Vec<Budget>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, category, amount, spent, timeframe, created_at, updated_at
             FROM budgets
             ORDER BY category ASC",
        )?;

        let rows = stmt.query_map([], row_to_budget)?;

        let mut budgets = Vec::new();
        for row in rows {
            budgets.push(row?);
        }
        Ok(budgets)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the mutable fields of a budget.  Returns `true` if a row
    /// was updated.
    pub fn update_budget(&self, budget: &Budget) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE budgets
             SET category = ?2, amount = ?3, spent = ?4, timeframe = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                budget.id.to_string(),
                budget.category,
                budget.amount,
                budget.spent,
                budget.timeframe.as_str(),
                budget.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Overwrite the denormalized `spent` total for a category's budget.
    ///
    /// Returns `false` if the category has no budget (a no-op, not an
    /// error).
    pub fn set_budget_spent(&self, category: &str, spent: f64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE budgets SET spent = ?2, updated_at = ?3 WHERE category = ?1",
            params![category, spent, Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a budget by UUID.  Returns `true` if a row was deleted.
    pub fn delete_budget(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM budgets WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Budget`].
fn row_to_budget(row: &rusqlite::Row<'_>) -> rusqlite::Result<Budget> {
    let id_str: String = row.get(0)?;
    let category: String = row.get(1)?;
    let amount: f64 = row.get(2)?;
    let spent: f64 = row.get(3)?;
    let timeframe_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Budget {
        id,
        category,
        amount,
        spent,
        timeframe: Timeframe::parse(&timeframe_str),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn sample(category: &str, amount: f64) -> Budget {
        let now = Utc::now();
        Budget {
            id: Uuid::new_v4(),
            category: category.to_string(),
            amount,
            spent: 0.0,
            timeframe: Timeframe::Monthly,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn category_is_unique() {
        let (db, _dir) = test_db();
        db.insert_budget(&sample("Food", 1000.0)).unwrap();
        assert!(db.insert_budget(&sample("Food", 500.0)).is_err());
    }

    #[test]
    fn set_spent_without_budget_is_noop() {
        let (db, _dir) = test_db();
        assert!(!db.set_budget_spent("Ghost", 100.0).unwrap());

        db.insert_budget(&sample("Food", 1000.0)).unwrap();
        assert!(db.set_budget_spent("Food", 350.0).unwrap());
        let budget = db.get_budget_for_category("Food").unwrap().unwrap();
        assert_eq!(budget.spent, 350.0);
    }
}
