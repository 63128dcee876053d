//! Shared types for the ToolHub crates: configuration, error taxonomy,
//! and structured trace events.

pub mod config;
pub mod error;
pub mod trace;

pub use error::RouteError;
