//! Expense mutations and the budget-consistency pipeline.
//!
//! Every create/update/delete runs the same sequence: persist the expense,
//! log an activity row, re-aggregate the affected budget's `spent` total,
//! evaluate warning thresholds, and broadcast.  Only the primary write can
//! fail the request; every later step is best-effort and reports failure at
//! warn level instead.  The steps are not wrapped in a transaction, so a
//! partial failure leaves the aggregate stale until the next mutation on the
//! same category re-aggregates it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use centime_store::{ActivityKind, Database, Expense, RecentActivity, StoreError};

use crate::api::AppState;
use crate::constants::{LARGE_EXPENSE_THRESHOLD, RECENT_ACTIVITY_LIMIT};
use crate::error::ServerError;
use crate::notify::Notification;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /expenses`.
#[derive(Debug, Deserialize)]
pub struct NewExpense {
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
}

/// Body of `PUT /expenses/{id}`.  Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct ExpensePatch {
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Mutation pipeline
// ---------------------------------------------------------------------------

/// Validate and persist a new expense, then run the secondary steps.
pub async fn create_expense(state: &AppState, input: NewExpense) -> Result<Expense, ServerError> {
    validate_new(&input)?;

    let now = Utc::now();
    let expense = Expense {
        id: Uuid::new_v4(),
        amount: input.amount,
        category: input.category,
        description: input.description,
        date: input.date,
        created_at: now,
        updated_at: now,
    };

    let warnings = {
        let db = state.db.lock().await;

        // Primary write.  A failure here fails the request and none of the
        // secondary steps run.
        db.insert_expense(&expense)?;
        info!(
            id = %expense.id,
            category = %expense.category,
            amount = expense.amount,
            "Expense created"
        );

        log_activity(&db, &expense, ActivityKind::Add);
        recalculate_spent(&db, &expense.category);
        evaluate_thresholds(&db, &expense)
    };

    broadcast_warnings(state, warnings).await;

    Ok(expense)
}

/// Apply a partial update to an existing expense, then run the secondary
/// steps against the new state.
pub async fn update_expense(
    state: &AppState,
    id: Uuid,
    patch: ExpensePatch,
) -> Result<Expense, ServerError> {
    validate_patch(&patch)?;

    let (expense, warnings) = {
        let db = state.db.lock().await;

        let old = fetch_expense(&db, id)?;
        let mut expense = old.clone();
        if let Some(amount) = patch.amount {
            expense.amount = amount;
        }
        if let Some(category) = patch.category {
            expense.category = category;
        }
        if let Some(description) = patch.description {
            expense.description = description;
        }
        if let Some(date) = patch.date {
            expense.date = date;
        }
        expense.updated_at = Utc::now();

        if !db.update_expense(&expense)? {
            return Err(ServerError::NotFound("Expense"));
        }
        info!(id = %expense.id, category = %expense.category, "Expense updated");

        // A category change must leave neither budget stale: the old and the
        // new category are re-aggregated independently.
        if old.category != expense.category || old.amount != expense.amount {
            recalculate_spent(&db, &old.category);
            if old.category != expense.category {
                recalculate_spent(&db, &expense.category);
            }
        }

        log_activity(&db, &expense, ActivityKind::Update);
        let warnings = evaluate_thresholds(&db, &expense);
        (expense, warnings)
    };

    broadcast_warnings(state, warnings).await;

    Ok(expense)
}

/// Delete an expense, logging its snapshot first.
pub async fn delete_expense(state: &AppState, id: Uuid) -> Result<(), ServerError> {
    let db = state.db.lock().await;

    let expense = fetch_expense(&db, id)?;

    // Logged before the row goes away: once the delete lands, the snapshot
    // fields in the activity row are all that remain of the expense.
    log_activity(&db, &expense, ActivityKind::Delete);

    if !db.delete_expense(id)? {
        return Err(ServerError::NotFound("Expense"));
    }
    info!(id = %id, category = %expense.category, "Expense deleted");

    recalculate_spent(&db, &expense.category);

    // Spending only decreases on delete; no threshold can newly trip.
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline steps
// ---------------------------------------------------------------------------

/// Append an activity row for the mutation and trim the trailing window.
/// Best-effort: a failure is logged and the request proceeds.
fn log_activity(db: &Database, expense: &Expense, kind: ActivityKind) {
    let activity = RecentActivity {
        id: Uuid::new_v4(),
        expense_id: expense.id,
        description: expense.description.clone(),
        category: expense.category.clone(),
        amount: expense.amount,
        date: expense.date,
        kind,
        created_at: Utc::now(),
    };

    if let Err(e) = db.insert_activity(&activity) {
        warn!(error = %e, expense = %expense.id, "Failed to record activity");
        return;
    }

    match db.trim_activities(RECENT_ACTIVITY_LIMIT) {
        Ok(0) => {}
        Ok(n) => debug!(trimmed = n, "Trimmed activity log"),
        Err(e) => warn!(error = %e, "Failed to trim activity log"),
    }
}

/// Re-aggregate a category's total onto its budget, if it has one.
/// Best-effort: a failure is logged and the stale value self-heals on the
/// next mutation in the category.
fn recalculate_spent(db: &Database, category: &str) {
    let result = db
        .sum_expenses_for_category(category)
        .and_then(|spent| db.set_budget_spent(category, spent).map(|updated| (spent, updated)));

    match result {
        Ok((spent, true)) => debug!(category, spent, "Recalculated budget spent total"),
        // A category may have expenses but no budget; nothing to update then.
        Ok((_, false)) => {}
        Err(e) => warn!(error = %e, category, "Failed to recalculate budget spent total"),
    }
}

/// Decide which warnings the mutation's resulting state calls for.  Both
/// checks are independent and may fire for the same mutation.
fn evaluate_thresholds(db: &Database, expense: &Expense) -> Vec<Notification> {
    let mut warnings = Vec::new();

    match db.get_budget_for_category(&expense.category) {
        Ok(Some(budget)) if budget.spent >= budget.amount => {
            warnings.push(Notification::budget_limit(&budget.category));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, category = %expense.category, "Failed to check budget threshold")
        }
    }

    if expense.amount > LARGE_EXPENSE_THRESHOLD {
        warnings.push(Notification::large_expense(expense.amount, &expense.description));
    }

    warnings
}

/// Fire-and-forget fan-out of the collected warnings.
async fn broadcast_warnings(state: &AppState, warnings: Vec<Notification>) {
    for warning in warnings {
        state.hub.broadcast(&warning).await;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_amount(amount: f64) -> Result<(), ServerError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ServerError::Validation(
            "expense amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_new(input: &NewExpense) -> Result<(), ServerError> {
    validate_amount(input.amount)?;
    if input.category.trim().is_empty() {
        return Err(ServerError::Validation(
            "expense category must not be empty".to_string(),
        ));
    }
    if input.description.trim().is_empty() {
        return Err(ServerError::Validation(
            "expense description must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_patch(patch: &ExpensePatch) -> Result<(), ServerError> {
    if let Some(amount) = patch.amount {
        validate_amount(amount)?;
    }
    if patch.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ServerError::Validation(
            "expense category must not be empty".to_string(),
        ));
    }
    if patch
        .description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        return Err(ServerError::Validation(
            "expense description must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn fetch_expense(db: &Database, id: Uuid) -> Result<Expense, ServerError> {
    match db.get_expense(id) {
        Ok(expense) => Ok(expense),
        Err(StoreError::NotFound) => Err(ServerError::NotFound("Expense")),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

/// `GET /expenses` -- all expenses, most recent date first.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Expense>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_expenses()?))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<u32>,
}

/// `GET /expenses/recent?limit=N` -- the N most recent expenses (default 5).
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Expense>>, ServerError> {
    let limit = params.limit.unwrap_or(5);
    let db = state.db.lock().await;
    Ok(Json(db.list_recent_expenses(limit)?))
}

/// `POST /expenses`
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>), ServerError> {
    let expense = create_expense(&state, input).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// `PUT /expenses/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ExpensePatch>,
) -> Result<Json<Expense>, ServerError> {
    let expense = update_expense(&state, id, patch).await?;
    Ok(Json(expense))
}

/// `DELETE /expenses/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    delete_expense(&state, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::{mpsc, Mutex};

    use centime_store::{Budget, Timeframe};

    use crate::notify::NotificationHub;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let state = AppState {
            db: Arc::new(Mutex::new(db)),
            hub: NotificationHub::new(),
        };
        (state, dir)
    }

    async fn seed_budget(state: &AppState, category: &str, amount: f64) {
        let now = Utc::now();
        let budget = Budget {
            id: Uuid::new_v4(),
            category: category.to_string(),
            amount,
            spent: 0.0,
            timeframe: Timeframe::Monthly,
            created_at: now,
            updated_at: now,
        };
        state.db.lock().await.insert_budget(&budget).unwrap();
    }

    fn input(amount: f64, category: &str, description: &str) -> NewExpense {
        NewExpense {
            amount,
            category: category.to_string(),
            description: description.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        }
    }

    async fn spent(state: &AppState, category: &str) -> f64 {
        state
            .db
            .lock()
            .await
            .get_budget_for_category(category)
            .unwrap()
            .unwrap()
            .spent
    }

    fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn create_recalculates_budget_spent() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 1000.0).await;

        create_expense(&state, input(200.0, "Food", "groceries"))
            .await
            .unwrap();
        assert_eq!(spent(&state, "Food").await, 200.0);

        create_expense(&state, input(300.0, "Food", "restaurant"))
            .await
            .unwrap();
        assert_eq!(spent(&state, "Food").await, 500.0);
    }

    #[tokio::test]
    async fn aggregate_tracks_full_mutation_sequence() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 10_000.0).await;

        let a = create_expense(&state, input(100.0, "Food", "a"))
            .await
            .unwrap();
        let b = create_expense(&state, input(200.0, "Food", "b"))
            .await
            .unwrap();
        create_expense(&state, input(300.0, "Food", "c"))
            .await
            .unwrap();

        update_expense(
            &state,
            a.id,
            ExpensePatch {
                amount: Some(250.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        delete_expense(&state, b.id).await.unwrap();

        let expected = state
            .db
            .lock()
            .await
            .sum_expenses_for_category("Food")
            .unwrap();
        assert_eq!(expected, 550.0);
        assert_eq!(spent(&state, "Food").await, expected);
    }

    #[tokio::test]
    async fn category_change_recalculates_both_budgets() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Groceries", 500.0).await;
        seed_budget(&state, "Travel", 500.0).await;

        let expense = create_expense(&state, input(100.0, "Groceries", "veg"))
            .await
            .unwrap();
        assert_eq!(spent(&state, "Groceries").await, 100.0);

        update_expense(
            &state,
            expense.id,
            ExpensePatch {
                category: Some("Travel".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(spent(&state, "Groceries").await, 0.0);
        assert_eq!(spent(&state, "Travel").await, 100.0);
    }

    #[tokio::test]
    async fn budget_limit_fires_exactly_on_threshold() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 1000.0).await;
        let (_conn, mut rx) = state.hub.register().await;

        create_expense(&state, input(900.0, "Food", "groceries"))
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        // 900 + 100 lands exactly on the limit; >= fires.
        create_expense(&state, input(100.0, "Food", "snacks"))
            .await
            .unwrap();
        let warnings = drain(&mut rx);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].title, "Budget Limit Reached");
        assert_eq!(
            warnings[0].message,
            "You've reached your budget limit for Food"
        );
    }

    #[tokio::test]
    async fn below_limit_fires_nothing() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 1000.0).await;
        let (_conn, mut rx) = state.hub.register().await;

        create_expense(&state, input(900.0, "Food", "groceries"))
            .await
            .unwrap();
        create_expense(&state, input(60.0, "Food", "coffee"))
            .await
            .unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(spent(&state, "Food").await, 960.0);
    }

    #[tokio::test]
    async fn large_expense_boundary_is_strict() {
        let (state, _dir) = test_state();
        let (_conn, mut rx) = state.hub.register().await;

        create_expense(&state, input(5000.0, "Electronics", "monitor"))
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        create_expense(&state, input(5001.0, "Electronics", "laptop"))
            .await
            .unwrap();
        let warnings = drain(&mut rx);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].title, "Large Expense Alert");
    }

    #[tokio::test]
    async fn over_budget_but_not_large_fires_budget_warning_only() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 1000.0).await;
        let (_conn, mut rx) = state.hub.register().await;

        create_expense(&state, input(1100.0, "Food", "catering"))
            .await
            .unwrap();

        assert_eq!(spent(&state, "Food").await, 1100.0);
        let warnings = drain(&mut rx);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].title, "Budget Limit Reached");
    }

    #[tokio::test]
    async fn update_can_trip_budget_limit() {
        let (state, _dir) = test_state();
        seed_budget(&state, "Food", 1000.0).await;
        let (_conn, mut rx) = state.hub.register().await;

        let expense = create_expense(&state, input(600.0, "Food", "groceries"))
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        update_expense(
            &state,
            expense.id,
            ExpensePatch {
                amount: Some(1200.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(spent(&state, "Food").await, 1200.0);
        let warnings = drain(&mut rx);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].title, "Budget Limit Reached");
    }

    #[tokio::test]
    async fn activity_log_keeps_last_five() {
        let (state, _dir) = test_state();

        for i in 0..7 {
            create_expense(&state, input(10.0 + i as f64, "Misc", &format!("e{i}")))
                .await
                .unwrap();
        }

        let db = state.db.lock().await;
        assert_eq!(db.count_activities().unwrap(), 5);

        let activities = db.list_recent_activities(10).unwrap();
        let names: Vec<&str> = activities.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(names, vec!["e6", "e5", "e4", "e3", "e2"]);
        assert!(activities.iter().all(|a| a.kind == ActivityKind::Add));
    }

    #[tokio::test]
    async fn delete_logs_snapshot_before_removal() {
        let (state, _dir) = test_state();

        let expense = create_expense(&state, input(12_000.0, "Housing", "Rent"))
            .await
            .unwrap();
        delete_expense(&state, expense.id).await.unwrap();

        let db = state.db.lock().await;
        let activities = db.list_recent_activities(5).unwrap();
        let entry = &activities[0];
        assert_eq!(entry.kind, ActivityKind::Delete);
        assert_eq!(entry.expense_id, expense.id);
        assert_eq!(entry.description, "Rent");
        assert_eq!(entry.category, "Housing");
        assert_eq!(entry.amount, 12_000.0);

        // The expense itself is gone; the snapshot is all that remains.
        assert!(matches!(
            db.get_expense(expense.id),
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn validation_rejects_bad_input_without_side_effects() {
        let (state, _dir) = test_state();

        for bad in [
            input(0.0, "Food", "zero"),
            input(-5.0, "Food", "negative"),
            input(10.0, "  ", "blank category"),
            input(10.0, "Food", ""),
        ] {
            assert!(matches!(
                create_expense(&state, bad).await,
                Err(ServerError::Validation(_))
            ));
        }

        let db = state.db.lock().await;
        assert_eq!(db.count_expenses().unwrap(), 0);
        assert_eq!(db.count_activities().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_expense_is_not_found() {
        let (state, _dir) = test_state();

        assert!(matches!(
            update_expense(&state, Uuid::new_v4(), ExpensePatch::default()).await,
            Err(ServerError::NotFound("Expense"))
        ));
        assert!(matches!(
            delete_expense(&state, Uuid::new_v4()).await,
            Err(ServerError::NotFound("Expense"))
        ));
    }
}
