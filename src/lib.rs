pub mod adapters;
pub mod agents;
pub mod analysis;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod services;
pub mod supervisor;

pub use adapters::{AlloraClient, BlockchainClient, IndexerClient, Predictor};
pub use agents::{MomentumAgent, MomentumAgentConfig, TradingAgent};
pub use config::AppConfig;
pub use coordination::{
    install_signal_handlers, BackoffPolicy, CancelToken, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, Clock, ManualClock, ShutdownController, SystemClock,
};
pub use error::{HelmsmanError, Result};
pub use services::{DecisionOutcome, EventSink, LogSink, RuntimeEvent};
pub use supervisor::{
    MemorySampler, ProcStatusSampler, ResourceMonitor, ResourceMonitorConfig, Supervisor,
    SupervisorConfig, ThresholdBreach,
};
