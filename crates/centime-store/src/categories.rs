//! CRUD operations for [`Category`] records.
//!
//! Categories are referenced by name from expenses and budgets.  Deleting a
//! category leaves those references in place (weak references by value).

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::Category;

impl Database {
    /// Insert a new category.
    pub fn insert_category(&self, category: &Category) -> Result<()> {
        self.conn().execute(
            "INSERT INTO categories (id, name, color, icon, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.id.to_string(),
                category.name,
                category.color,
                category.icon,
                category.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List all categories, ordered by name.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, color, icon, created_at
             FROM categories
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map([], row_to_category)?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    /// Delete a category by UUID.  Returns `true` if a row was deleted.
    /// Expenses and budgets referencing the name are untouched.
    pub fn delete_category(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM categories WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

/// Map a `rusqlite::Row` to a [`Category`].
fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let color: String = row.get(2)?;
    let icon: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Category {
        id,
        name,
        color,
        icon,
        created_at,
    })
}
