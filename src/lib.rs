//! Persistence layer for the student voice Telegram bot.
//!
//! Stores registered students, a singleton administrator, user-submitted
//! posts ("tweets"), and admin-approved requests in an embedded SQLite
//! database. Bot command handlers and schedulers live elsewhere and call
//! into the repository API exposed by [`db`].

pub mod config;
pub mod db;
pub mod model;

pub use config::{AdminConfig, Config};
pub use db::{init_pool, run_migrations, Pool, StoreError};
