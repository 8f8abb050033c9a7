//! Application-wide constants.

/// Expenses with an amount strictly above this trigger a "Large Expense
/// Alert" push.  An expense of exactly this amount does not.
pub const LARGE_EXPENSE_THRESHOLD: f64 = 5000.0;

/// Number of rows retained by the trailing-window activity log.
pub const RECENT_ACTIVITY_LIMIT: u32 = 5;

/// Number of expenses shown in the dashboard's recent list.
pub const DASHBOARD_RECENT_EXPENSES: u32 = 5;

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: u16 = 3002;
