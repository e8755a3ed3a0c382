//! Minimal-downtime Postgres migrations driven by `pg_dump` and logical replication.
//!
//! A run restores the source's schema on the target with primary keys only, lets a
//! subscription copy the data, then finishes the remaining indexes and constraints while the
//! subscription is paused. The [`orchestrator::MigrationOrchestrator`] derives where a previous
//! run stopped from the target's live subscriptions, so re-running it resumes instead of
//! starting over.

pub mod bootstrap;
pub mod catalog;
pub mod dump;
pub mod error;
pub mod gateway;
mod macros;
pub mod orchestrator;
pub mod replication;
pub mod rewrite;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
