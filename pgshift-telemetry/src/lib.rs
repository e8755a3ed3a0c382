//! Tracing setup shared by pgshift binaries.

pub mod tracing;
