//! # ember-store
//!
//! SQLite persistence for the Ember swipe engine.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, a [`Store`] pool handing those out per request,
//! and one module of typed helpers per entity.  Helpers take a plain
//! `&Connection` so the same call works on a bare connection or inside a
//! `Transaction` opened by the engine.

pub mod abuse;
pub mod codec;
pub mod database;
pub mod decisions;
pub mod matches;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod profiles;
pub mod quotas;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use pool::Store;
