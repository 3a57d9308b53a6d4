//! Utils Module - Shared helpers
//!
//! Constants, the report cache and telemetry.

pub mod cache;
pub mod constants;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use telemetry::*;
