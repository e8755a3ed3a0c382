//! Statement execution against one Postgres endpoint.

mod base;
mod client;

pub use base::{QueryRows, Row, SqlGateway, TransactionOutcome};
pub use client::PgGateway;
