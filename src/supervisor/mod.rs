//! Runtime supervision
//!
//! The scheduling loop that drives registered agents, plus the resource
//! monitor that watches process memory and tick latency.

pub mod resource_monitor;
pub mod runtime;

pub use resource_monitor::{
    MemorySampler, ProcStatusSampler, ResourceMonitor, ResourceMonitorConfig, ResourceSample,
    ThresholdBreach,
};
pub use runtime::{Supervisor, SupervisorConfig};
