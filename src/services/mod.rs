//! Observability services
//!
//! Structured runtime events and the sinks that publish them.

pub mod events;

pub use events::{DecisionOutcome, EventSink, LogSink, RuntimeEvent};
