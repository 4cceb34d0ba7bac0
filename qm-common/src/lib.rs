//! # Quartermaster Common Library
//!
//! Shared code for the Quartermaster services:
//! - Database bootstrap, schema and shared row models
//! - Event types (LogisticsEvent) and the EventBus
//! - Configuration loading and root folder resolution
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
