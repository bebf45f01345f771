/*
[INPUT]:  CLI arguments, YAML configuration file, BINANCE_* env, OS shutdown signals
[OUTPUT]: Running market data stream (or stress run) with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use binance_stream_adapter::{SubscriptionManager, TungsteniteConnector};
use binance_stream_runner::{
    AppConfig, MarketDataService, ServiceExit, StatusState, StressConfig, check_server_clock,
    run_stress, server,
};

#[derive(Parser, Debug)]
#[command(name = "binance-stream-runner", version, about = "Resilient Binance market stream runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    /// Overrides the configured log level
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
    /// Also write daily-rolling log files here
    #[arg(long = "log-dir", value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[arg(long = "dry-run")]
    dry_run: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Stream the configured subscriptions and serve status endpoints (default)
    Run,
    /// Open many independent connections and report how they hold up
    Stress {
        #[arg(long, default_value_t = 100)]
        connections: usize,
        #[arg(long = "duration-secs", default_value_t = 60)]
        duration_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    let args = Cli::parse();

    let config = AppConfig::load(args.config_path.as_deref()).context("load config")?;
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let _log_guard = init_tracing(log_level, args.log_dir.as_deref())?;

    info!(
        config_path = ?args.config_path,
        environment = config.environment.as_str(),
        dotenv_loaded,
        dry_run = args.dry_run,
        "starting binance-stream-runner"
    );
    info!(
        ws_url = %config.ws_url,
        streams = config.streams.len(),
        credentials = config.has_credentials(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_service(config, shutdown).await,
        Command::Stress {
            connections,
            duration_secs,
        } => {
            let stress = StressConfig::new(
                connections,
                Duration::from_secs(duration_secs),
                config.session_config(),
            );
            let report = run_stress(stress, Arc::new(TungsteniteConnector), shutdown).await;
            info!(
                initiated = report.initiated,
                failed = report.failed,
                open = report.open_at_end,
                messages = report.messages,
                "stress summary"
            );
            Ok(())
        }
    }
}

async fn run_service(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    check_server_clock(&config.api_url).await;

    let mut manager =
        SubscriptionManager::new(config.session_config()).context("create subscription manager")?;
    let events = manager
        .take_receiver()
        .context("subscription event receiver already taken")?;
    let manager = Arc::new(manager);

    let service = MarketDataService::new(manager.clone());
    let added = service
        .subscribe_streams(config.streams.iter().cloned())
        .context("register initial subscriptions")?;
    info!(count = added.len(), "initial subscriptions registered");

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("bind status server on port {}", config.port))?;
    let status = StatusState::new(config.environment, manager.clone(), service.metrics());
    let server_handle = tokio::spawn(server::serve(listener, status, shutdown.clone()));

    manager.connect().context("connect stream session")?;
    let exit = service.run(events, shutdown.clone()).await;

    shutdown.cancel();
    manager.shutdown_and_wait().await;
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "status server failed"),
        Err(err) => warn!(error = %err, "status server task failed"),
    }
    info!(?exit, "shutdown complete");

    if exit == ServiceExit::ReconnectExhausted {
        bail!("stream reconnect attempts exhausted");
    }
    Ok(())
}

fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    let appender = tracing_appender::rolling::daily(log_dir, "binance-stream-runner.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(Some(guard))
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
