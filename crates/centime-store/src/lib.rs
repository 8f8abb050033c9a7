//! # centime-store
//!
//! Local persistence for the Centime expense tracker, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model.  Associations between entities are deliberately weak: budgets and
//! activities reference expenses by category name or id without any
//! foreign-key enforcement, so deleting one record never cascades.

pub mod activities;
pub mod budgets;
pub mod categories;
pub mod database;
pub mod expenses;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
