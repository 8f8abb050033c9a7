//! Domain model structs persisted in the expense database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer as a JSON body.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Expense
// ---------------------------------------------------------------------------

/// A single recorded expense.
///
/// Expenses reference their category by name, not by id, so renaming or
/// deleting a [`Category`] leaves existing expenses untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    /// Unique expense identifier.
    pub id: Uuid,
    /// Amount spent.  Always strictly positive.
    pub amount: f64,
    /// Category name this expense counts against.
    pub category: String,
    /// Free-form description entered by the user.
    pub description: String,
    /// Calendar date the expense occurred on.
    pub date: NaiveDate,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Budget period granularity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Weekly => "weekly",
            Timeframe::Monthly => "monthly",
            Timeframe::Yearly => "yearly",
        }
    }

    /// Parse the stored text form.  Unknown values fall back to monthly
    /// rather than failing the whole row.
    pub fn parse(s: &str) -> Self {
        match s {
            "weekly" => Timeframe::Weekly,
            "yearly" => Timeframe::Yearly,
            _ => Timeframe::Monthly,
        }
    }
}

/// A per-category spending budget.
///
/// `spent` is a denormalized cache of the sum over all expenses in the
/// category.  It is rewritten by full re-aggregation after every expense
/// mutation, never adjusted incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    /// Unique budget identifier.
    pub id: Uuid,
    /// Category name.  At most one budget exists per category.
    pub category: String,
    /// Budget limit for the timeframe.
    pub amount: f64,
    /// Cached total spent in this category.
    pub spent: f64,
    /// Period the budget applies to.
    pub timeframe: Timeframe,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A display category for grouping expenses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    /// Unique category identifier.
    pub id: Uuid,
    /// Category name.  Expenses and budgets reference this by value.
    pub name: String,
    /// Display color (any CSS color string, opaque to the server).
    pub color: String,
    /// Optional icon name.
    pub icon: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RecentActivity
// ---------------------------------------------------------------------------

/// Kind of expense mutation an activity row records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Add,
    Update,
    Delete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Add => "add",
            ActivityKind::Update => "update",
            ActivityKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "update" => ActivityKind::Update,
            "delete" => ActivityKind::Delete,
            _ => ActivityKind::Add,
        }
    }
}

/// One entry in the trailing-window activity log.
///
/// `expense_id` is a soft reference: after the expense is deleted the id
/// dangles, and the snapshot fields below are all that remain of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentActivity {
    /// Unique activity identifier.
    pub id: Uuid,
    /// Id of the expense this activity describes (may dangle after delete).
    pub expense_id: Uuid,
    /// Snapshot of the expense description at mutation time.
    pub description: String,
    /// Snapshot of the expense category at mutation time.
    pub category: String,
    /// Snapshot of the expense amount at mutation time.
    pub amount: f64,
    /// Calendar date of the underlying expense.
    pub date: NaiveDate,
    /// Which mutation produced this entry.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// When the entry was logged.  Retention ranks by this field.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trip() {
        for tf in [Timeframe::Weekly, Timeframe::Monthly, Timeframe::Yearly] {
            assert_eq!(Timeframe::parse(tf.as_str()), tf);
        }
        assert_eq!(Timeframe::parse("fortnightly"), Timeframe::Monthly);
    }

    #[test]
    fn activity_kind_serializes_as_type_tag() {
        let activity = RecentActivity {
            id: Uuid::nil(),
            expense_id: Uuid::nil(),
            description: "Rent".to_string(),
            category: "Housing".to_string(),
            amount: 1200.0,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            kind: ActivityKind::Delete,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], "delete");
        assert!(json.get("kind").is_none());
    }
}
