//! Publication and subscription management.

pub mod publication;
pub mod subscription;
pub mod sync;
