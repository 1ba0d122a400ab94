//! CLI command implementations.

pub mod backfill;
pub mod resolve;
pub mod validate;
