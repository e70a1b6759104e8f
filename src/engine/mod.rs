//! Detection, drilldown and context assembly.
//!
//! Everything here is synchronous and side-effect free.

pub mod context;
pub mod drilldown;
pub mod triggers;

pub use context::{assemble, empty_context, SentinelContext};
pub use triggers::TriggerEngine;
