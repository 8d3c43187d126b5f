//! Core building blocks shared by every other module: configuration, the
//! top-level error type and the cached response envelope.

pub mod config;
pub mod error;
pub mod types;
