//! CRUD and aggregation helpers for [`Expense`] records.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Expense;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new expense.
    pub fn insert_expense(&self, expense: &Expense) -> Result<()> {
        self.conn().execute(
            "INSERT INTO expenses (id, amount, category, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                expense.id.to_string(),
                expense.amount,
                expense.category,
                expense.description,
                expense.date.format("%Y-%m-%d").to_string(),
                expense.created_at.to_rfc3339(),
                expense.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single expense by UUID.
    pub fn get_expense(&self, id: Uuid) -> Result<Expense> {
        self.conn()
            .query_row(
                "SELECT id, amount, category, description, date, created_at, updated_at
                 FROM expenses WHERE id = ?1",
                params![id.to_string()],
                row_to_expense,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all expenses, most recent date first.
    pub fn list_expenses(&self) -> Result<Vec<Expense>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, amount, category, description, date, created_at, updated_at
             FROM expenses
             ORDER BY date DESC, created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_expense)?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(row?);
        }
        Ok(expenses)
    }

    /// List the `limit` most recent expenses by date.
    pub fn list_recent_expenses(&self, limit: u32) -> Result<Vec<Expense>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, amount, category, description, date, created_at, updated_at
             FROM expenses
             ORDER BY date DESC, created_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], row_to_expense)?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(row?);
        }
        Ok(expenses)
    }

    /// Total amount over all expenses with the given category name.
    ///
    /// Returns `0.0` for a category with no expenses, so callers can always
    /// write the result back onto a budget unconditionally.
    pub fn sum_expenses_for_category(&self, category: &str) -> Result<f64> {
        let sum: f64 = self.conn().query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE category = ?1",
            params![category],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// Total amount over all expenses.
    pub fn sum_expenses(&self) -> Result<f64> {
        let sum: f64 = self.conn().query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses",
            [],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// Per-category totals over all expenses.
    pub fn sum_expenses_by_category(&self) -> Result<Vec<(String, f64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT category, SUM(amount) FROM expenses
             GROUP BY category
             ORDER BY category ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let category: String = row.get(0)?;
            let total: f64 = row.get(1)?;
            Ok((category, total))
        })?;

        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }

    /// Number of expense records.
    pub fn count_expenses(&self) -> Result<u32> {
        let count: u32 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the mutable fields of an expense.  Returns `true` if a row
    /// was updated.
    pub fn update_expense(&self, expense: &Expense) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE expenses
             SET amount = ?2, category = ?3, description = ?4, date = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                expense.id.to_string(),
                expense.amount,
                expense.category,
                expense.description,
                expense.date.format("%Y-%m-%d").to_string(),
                expense.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an expense by UUID.  Returns `true` if a row was deleted.
    pub fn delete_expense(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM expenses WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`Expense`].
fn row_to_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<Expense> {
    let id_str: String = row.get(0)?;
    let amount: f64 = row.get(1)?;
    let category: String = row.get(2)?;
    let description: String = row.get(3)?;
    let date_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
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

    Ok(Expense {
        id,
        amount,
        category,
        description,
        date,
        created_at,
        updated_at,
    })
}
