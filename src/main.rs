use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use helmsman::config::LoggingConfig;
use helmsman::{
    install_signal_handlers, AlloraClient, AppConfig, BlockchainClient, CircuitBreaker,
    CircuitBreakerConfig, Clock, EventSink, IndexerClient, LogSink, MomentumAgent,
    MomentumAgentConfig, Predictor, ProcStatusSampler, ResourceMonitor, ShutdownController,
    Supervisor, SupervisorConfig, SystemClock,
};

#[derive(Parser, Debug)]
#[command(
    name = "helmsman",
    about = "Risk-bounded autonomous trading agent runtime",
    version
)]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Signing key authorizing order submission. Prefer the environment
    /// variable over the flag so the key stays out of shell history.
    #[arg(long, env = "HELMSMAN_SIGNING_KEY", hide_env_values = true)]
    signing_key: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();
    let signing_key = Zeroizing::new(std::mem::take(&mut cli.signing_key));

    let config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let _log_guard = init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("invalid configuration: {}", e);
        }
        return ExitCode::from(2);
    }

    info!(
        markets = config.markets.len(),
        network = %config.indexer.network,
        "starting helmsman"
    );

    match run(config, signing_key).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, signing_key: Zeroizing<String>) -> helmsman::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let events: Arc<dyn EventSink> = Arc::new(LogSink);

    let indexer: Arc<dyn BlockchainClient> = Arc::new(IndexerClient::new(
        config.indexer.base_url.as_str(),
        config.indexer.request_timeout(),
        signing_key,
    )?);
    let predictor: Arc<dyn Predictor> = Arc::new(AlloraClient::new(
        config.predictor.base_url.as_str(),
        config.predictor.api_key.as_str(),
        config.predictor.model_id.as_str(),
        config.predictor.request_timeout(),
    )?);

    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: config.supervisor.max_consecutive_failures,
            backoff: config.supervisor.backoff(),
        },
        clock.clone(),
    );
    let monitor = ResourceMonitor::new(
        config.resources.monitor_config(),
        Box::new(ProcStatusSampler),
    );

    let controller = Arc::new(ShutdownController::new());
    install_signal_handlers(controller.clone());

    let mut supervisor = Supervisor::new(
        SupervisorConfig {
            tick_interval: config.supervisor.tick_interval(),
            agent_timeout: config.supervisor.agent_timeout(),
            drain_grace: config.supervisor.drain_grace(),
        },
        breaker,
        monitor,
        events,
        controller.token(),
    );

    for market in &config.markets {
        let agent = MomentumAgent::new(
            MomentumAgentConfig {
                market: market.clone(),
                min_confidence: config.predictor.min_confidence,
                horizon: config.predictor.horizon(),
                history_lookback: config.indexer.history_lookback(),
            },
            indexer.clone(),
            predictor.clone(),
            clock.clone(),
        );
        supervisor.register_agent(Box::new(agent));
    }

    supervisor.run().await
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,helmsman={}", config.level)));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "helmsman.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.json {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .json()
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .init();
            }
            Some(guard)
        }
        None => {
            if config.json {
                tracing_subscriber::fmt().with_env_filter(filter).json().init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .init();
            }
            None
        }
    }
}
