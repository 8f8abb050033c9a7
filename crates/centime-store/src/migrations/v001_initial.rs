//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `expenses`, `budgets`, `categories`, and
//! `recent_activities`.  There are intentionally no foreign keys: budgets
//! reference expenses by category name and activities reference expenses by
//! id, and both references may dangle.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Expenses
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS expenses (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    amount      REAL NOT NULL,
    category    TEXT NOT NULL,               -- category name, not an id
    description TEXT NOT NULL,
    date        TEXT NOT NULL,               -- ISO-8601 calendar date
    created_at  TEXT NOT NULL,               -- RFC-3339
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category);
CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date DESC);

-- ----------------------------------------------------------------
-- Budgets
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS budgets (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    category   TEXT NOT NULL UNIQUE,         -- one budget per category
    amount     REAL NOT NULL,
    spent      REAL NOT NULL DEFAULT 0,      -- denormalized aggregate
    timeframe  TEXT NOT NULL DEFAULT 'monthly',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Categories
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    name       TEXT NOT NULL,
    color      TEXT NOT NULL,
    icon       TEXT,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Recent activities (trailing-window log, last 5 kept)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS recent_activities (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    expense_id  TEXT NOT NULL,               -- soft reference, may dangle
    description TEXT NOT NULL,
    category    TEXT NOT NULL,
    amount      REAL NOT NULL,
    date        TEXT NOT NULL,               -- ISO-8601 calendar date
    kind        TEXT NOT NULL,               -- add | update | delete
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recent_activities_created
    ON recent_activities(created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
