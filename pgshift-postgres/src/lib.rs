//! Postgres naming conventions and SQL text used by pgshift.
//!
//! Nothing in this crate talks to a database: every function returns statement text that the
//! engine executes through its connection gateway.

pub mod catalog;
pub mod replication;
pub mod types;
