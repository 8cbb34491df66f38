//! Shared error types and storage paths.

pub mod errors;
pub mod paths;
