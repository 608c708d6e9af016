//! NotiPrefs library crate
//!
//! Notification preference management: organizations own groups, groups own
//! topics, and users opt in per topic and channel with a group-level
//! override. [`PreferenceResolver`] answers whether a notification may be
//! sent; the rest of the crate stores and edits the data it reads.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod decision;
pub mod error;
pub mod models;
pub mod overview;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use decision::{Decision, DenyReason, Outcome, PreferenceResolver};
pub use error::{Error, Result};
pub use models::{Channel, ChannelSet, Role};
pub use store::{InMemoryStore, PgStore, PreferenceLookup, Repository};
