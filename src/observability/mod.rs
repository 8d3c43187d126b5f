//! # Observability
//!
//! Structured logging setup. Counters are recorded through the `metrics`
//! facade at their call sites and are no-ops until a recorder is installed.

pub mod logging;

pub use logging::init_logging;
