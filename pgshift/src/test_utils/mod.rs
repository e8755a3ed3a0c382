//! Test doubles for the engine's external collaborators.
//!
//! [`gateway::StubGateway`] stands in for a Postgres endpoint and [`dump::StubDumpExtractor`]
//! for `pg_dump`, so the orchestrator can be exercised end to end without a database.
//! [`scenario::MigrationScenario`] wires both into a ready-made source/target pair.

pub mod dump;
pub mod fixtures;
pub mod gateway;
pub mod scenario;
