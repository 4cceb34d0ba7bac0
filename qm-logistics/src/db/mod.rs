//! Storage layer
//!
//! Store functions take either the pool (they own their transaction) or a
//! `&mut SqliteConnection` (they run inside the caller's transaction).

pub mod bindings;
pub mod items;
pub mod ledger;
pub mod projects;
pub mod recipes;
pub mod snapshot;
