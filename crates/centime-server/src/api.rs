use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use centime_store::{Budget, Category, Database, Expense, RecentActivity, StoreError, Timeframe};

use crate::constants::{DASHBOARD_RECENT_EXPENSES, RECENT_ACTIVITY_LIMIT};
use crate::error::ServerError;
use crate::expenses;
use crate::notify::{self, NotificationHub};

/// Shared handle to the expense database.  rusqlite connections are not
/// `Sync`, so handlers serialize store access through this mutex.
pub type SharedDb = Arc<Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub hub: NotificationHub,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/expenses", get(expenses::list).post(expenses::create))
        .route("/expenses/recent", get(expenses::recent))
        .route(
            "/expenses/:id",
            put(expenses::update).delete(expenses::remove),
        )
        .route("/budgets", get(list_budgets).post(create_budget))
        .route("/budgets/:id", put(update_budget).delete(remove_budget))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", delete(remove_category))
        .route("/recent-activities", get(recent_activities))
        .route("/dashboard", get(dashboard))
        .route("/ws", get(notify::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewBudget {
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub timeframe: Timeframe,
}

/// Body of `PUT /budgets/{id}`.  Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct BudgetPatch {
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub timeframe: Option<Timeframe>,
}

fn validate_budget_amount(amount: f64) -> Result<(), ServerError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ServerError::Validation(
            "budget amount must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn list_budgets(State(state): State<AppState>) -> Result<Json<Vec<Budget>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_budgets()?))
}

async fn create_budget(
    State(state): State<AppState>,
    Json(input): Json<NewBudget>,
) -> Result<(StatusCode, Json<Budget>), ServerError> {
    validate_budget_amount(input.amount)?;
    if input.category.trim().is_empty() {
        return Err(ServerError::Validation(
            "budget category must not be empty".to_string(),
        ));
    }

    let db = state.db.lock().await;

    if db.get_budget_for_category(&input.category)?.is_some() {
        return Err(ServerError::Validation(format!(
            "a budget already exists for category {}",
            input.category
        )));
    }

    // A budget created after its expenses starts with an honest `spent`
    // instead of zero.
    let spent = db.sum_expenses_for_category(&input.category)?;

    let now = Utc::now();
    let budget = Budget {
        id: Uuid::new_v4(),
        category: input.category,
        amount: input.amount,
        spent,
        timeframe: input.timeframe,
        created_at: now,
        updated_at: now,
    };
    db.insert_budget(&budget)?;

    info!(id = %budget.id, category = %budget.category, "Budget created");
    Ok((StatusCode::CREATED, Json(budget)))
}

async fn update_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<BudgetPatch>,
) -> Result<Json<Budget>, ServerError> {
    if let Some(amount) = patch.amount {
        validate_budget_amount(amount)?;
    }
    if patch.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ServerError::Validation(
            "budget category must not be empty".to_string(),
        ));
    }

    let db = state.db.lock().await;

    let mut budget = match db.get_budget(id) {
        Ok(budget) => budget,
        Err(StoreError::NotFound) => return Err(ServerError::NotFound("Budget")),
        Err(e) => return Err(e.into()),
    };

    if let Some(category) = patch.category {
        if category != budget.category {
            if db.get_budget_for_category(&category)?.is_some() {
                return Err(ServerError::Validation(format!(
                    "a budget already exists for category {category}"
                )));
            }
            budget.category = category;
        }
    }
    if let Some(amount) = patch.amount {
        budget.amount = amount;
    }
    if let Some(timeframe) = patch.timeframe {
        budget.timeframe = timeframe;
    }

    // Re-aggregate for the (possibly new) category so `spent` stays honest.
    budget.spent = db.sum_expenses_for_category(&budget.category)?;
    budget.updated_at = Utc::now();

    if !db.update_budget(&budget)? {
        return Err(ServerError::NotFound("Budget"));
    }

    info!(id = %budget.id, category = %budget.category, "Budget updated");
    Ok(Json(budget))
}

async fn remove_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let db = state.db.lock().await;
    if !db.delete_budget(id)? {
        return Err(ServerError::NotFound("Budget"));
    }

    info!(id = %id, "Budget deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_categories()?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ServerError> {
    if input.name.trim().is_empty() {
        return Err(ServerError::Validation(
            "category name must not be empty".to_string(),
        ));
    }
    if input.color.trim().is_empty() {
        return Err(ServerError::Validation(
            "category color must not be empty".to_string(),
        ));
    }

    let category = Category {
        id: Uuid::new_v4(),
        name: input.name,
        color: input.color,
        icon: input.icon,
        created_at: Utc::now(),
    };

    let db = state.db.lock().await;
    db.insert_category(&category)?;

    info!(id = %category.id, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// Deleting a category leaves expenses and budgets that reference the name
/// untouched (weak references by value, no cascade).
async fn remove_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let db = state.db.lock().await;
    if !db.delete_category(id)? {
        return Err(ServerError::NotFound("Category"));
    }

    info!(id = %id, "Category deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// Recent activities & dashboard
// ---------------------------------------------------------------------------

/// `GET /recent-activities` -- at most 5 rows, newest first.
async fn recent_activities(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecentActivity>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_recent_activities(RECENT_ACTIVITY_LIMIT)?))
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_spent: f64,
    pub recent_expenses: Vec<Expense>,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub total_expenses: u32,
}

/// `GET /dashboard` -- aggregate view over all expenses.
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardSummary>, ServerError> {
    let db = state.db.lock().await;

    let total_spent = db.sum_expenses()?;
    let recent_expenses = db.list_recent_expenses(DASHBOARD_RECENT_EXPENSES)?;
    let expenses_by_category: BTreeMap<String, f64> =
        db.sum_expenses_by_category()?.into_iter().collect();
    let total_expenses = db.count_expenses()?;

    Ok(Json(DashboardSummary {
        total_spent,
        recent_expenses,
        expenses_by_category,
        total_expenses,
    }))
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::expenses::{create_expense, NewExpense};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let state = AppState {
            db: Arc::new(Mutex::new(db)),
            hub: NotificationHub::new(),
        };
        (state, dir)
    }

    fn expense_input(amount: f64, category: &str, description: &str) -> NewExpense {
        NewExpense {
            amount,
            category: category.to_string(),
            description: description.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        }
    }

    #[tokio::test]
    async fn budget_created_after_expenses_starts_consistent() {
        let (state, _dir) = test_state();

        create_expense(&state, expense_input(120.0, "Food", "a"))
            .await
            .unwrap();
        create_expense(&state, expense_input(80.0, "Food", "b"))
            .await
            .unwrap();

        let (status, Json(budget)) = create_budget(
            State(state.clone()),
            Json(NewBudget {
                category: "Food".to_string(),
                amount: 1000.0,
                timeframe: Timeframe::Monthly,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(budget.spent, 200.0);
    }

    #[tokio::test]
    async fn duplicate_budget_category_is_rejected() {
        let (state, _dir) = test_state();

        let input = || {
            Json(NewBudget {
                category: "Food".to_string(),
                amount: 1000.0,
                timeframe: Timeframe::Monthly,
            })
        };

        create_budget(State(state.clone()), input()).await.unwrap();
        assert!(matches!(
            create_budget(State(state.clone()), input()).await,
            Err(ServerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn budget_update_follows_category_change() {
        let (state, _dir) = test_state();

        create_expense(&state, expense_input(300.0, "Travel", "flight"))
            .await
            .unwrap();

        let (_, Json(budget)) = create_budget(
            State(state.clone()),
            Json(NewBudget {
                category: "Food".to_string(),
                amount: 1000.0,
                timeframe: Timeframe::Monthly,
            }),
        )
        .await
        .unwrap();
        assert_eq!(budget.spent, 0.0);

        let Json(updated) = update_budget(
            State(state.clone()),
            Path(budget.id),
            Json(BudgetPatch {
                category: Some("Travel".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.category, "Travel");
        assert_eq!(updated.spent, 300.0);
    }

    #[tokio::test]
    async fn dashboard_aggregates_all_expenses() {
        let (state, _dir) = test_state();

        create_expense(&state, expense_input(100.0, "Food", "a"))
            .await
            .unwrap();
        create_expense(&state, expense_input(200.0, "Food", "b"))
            .await
            .unwrap();
        create_expense(&state, expense_input(50.0, "Travel", "c"))
            .await
            .unwrap();

        let Json(summary) = dashboard(State(state.clone())).await.unwrap();

        assert_eq!(summary.total_spent, 350.0);
        assert_eq!(summary.total_expenses, 3);
        assert_eq!(summary.expenses_by_category["Food"], 300.0);
        assert_eq!(summary.expenses_by_category["Travel"], 50.0);
        assert_eq!(summary.recent_expenses.len(), 3);
    }

    #[tokio::test]
    async fn category_delete_does_not_cascade() {
        let (state, _dir) = test_state();

        let (_, Json(category)) = create_category(
            State(state.clone()),
            Json(NewCategory {
                name: "Food".to_string(),
                color: "#ff0000".to_string(),
                icon: None,
            }),
        )
        .await
        .unwrap();

        create_expense(&state, expense_input(100.0, "Food", "a"))
            .await
            .unwrap();

        remove_category(State(state.clone()), Path(category.id))
            .await
            .unwrap();

        // Expenses referencing the name by value survive the delete.
        let db = state.db.lock().await;
        assert_eq!(db.count_expenses().unwrap(), 1);
        assert!(db.list_categories().unwrap().is_empty());
    }
}
