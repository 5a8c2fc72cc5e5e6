//! Database module: entity repositories over SQLite.
//!
//! This module is split into two submodules:
//! - `model`: repository-facing parameter structs and seed constants.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `studentbot_db::db` — we re-export
//! the repository API and commonly used types for convenience.

pub mod model;
pub mod repo;

pub use model::NewTweet;
pub use repo::*;
