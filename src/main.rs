//! Solana Dashboard - command line entry point
//!
//! `serve` runs the background tasks (Helius key refresh, health checks)
//! until SIGINT/SIGTERM. Every other subcommand performs one dashboard query
//! and prints the result as pretty JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::process;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use tracing_appender::non_blocking::WorkerGuard;

use solana_dashboard::{
    application::Application,
    config::{AppConfig, CliArgs, ConfigLoader},
    infrastructure::monitoring::metrics,
    utils::{telemetry, Command},
    WalletAddress,
};

#[tokio::main]
async fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("Failed to install color-eyre: {}", e);
        process::exit(1);
    }

    if let Err(e) = run().await {
        eprintln!("\n❌ {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("   Caused by: {}", cause);
        }
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli_args = CliArgs::parse();
    let command = cli_args.command();

    let config = ConfigLoader::new()
        .with_cli_args(cli_args.clone())
        .load()
        .await
        .context("Configuration loading failed")?;

    let _log_guard = init_telemetry(&config)?;
    log_configuration_summary(&config);

    if config.monitoring.enable_metrics {
        metrics::install_prometheus(config.monitoring.metrics_port)?;
    }

    let app = Application::build(config)
        .await
        .context("Application initialization failed")?;

    match command {
        Command::Serve => serve(app).await,
        other => {
            let result = execute(&app, other).await;
            app.shutdown().await?;
            result
        }
    }
}

fn init_telemetry(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let env = &config.environment;
    match &env.log_directory {
        Some(dir) => {
            let guard = telemetry::init_with_file_rotation(&env.log_level, &env.log_format, dir, "dashboard")
                .context("Failed to initialize telemetry")?;
            Ok(Some(guard))
        }
        None => {
            telemetry::init(&env.log_level, &env.log_format).context("Failed to initialize telemetry")?;
            Ok(None)
        }
    }
}

fn log_configuration_summary(config: &AppConfig) {
    info!("📊 Configuration Summary:");
    info!("   Environment: {}", config.environment());
    if config.use_in_memory_store() {
        info!("   Store: in-memory");
    } else {
        info!("   Store: Supabase at {}", config.supabase.url);
    }
    info!("   Solana RPC: {}", config.solana.rpc_url);
    info!("   Helius key refresh: every {}s", config.helius.key_refresh_interval_seconds);
    info!("   Default daily limit: {} SOL", config.security.default_daily_limit_sol);
    info!("   Metrics Enabled: {}", config.monitoring.enable_metrics);

    if config.is_development() {
        warn!("⚠️  Running in DEVELOPMENT mode");
    }
}

#[instrument(skip(app))]
async fn serve(app: Application) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    app.run(cancel).await.context("Application runtime error")?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => warn!("🛑 Received SIGTERM signal"),
                    _ = sigint.recv() => warn!("🛑 Received SIGINT signal (Ctrl+C)"),
                }
                return;
            }
            _ => warn!("⚠️  Failed to register signal handlers, waiting for Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️  Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    warn!("🛑 Received Ctrl+C signal");
}

async fn execute(app: &Application, command: Command) -> Result<()> {
    let services = app.services();

    match command {
        Command::Serve => anyhow::bail!("serve is not a one-shot command"),
        Command::Portfolio { address } => {
            load_helius_keys(app).await;
            print_json(&services.wallet.portfolio(&address).await?)
        }
        Command::Transactions { address, limit } => {
            load_helius_keys(app).await;
            let wallet = WalletAddress::from_str(&address)?;
            print_json(&services.transactions.load_wallet_transactions(&wallet, limit).await?)
        }
        Command::Bots { user_id } => print_json(&services.bots.list_bots(&user_id).await?),
        Command::Prices { mints } => print_json(&services.market.token_prices(&mints).await?),
        Command::Backup { user_id } => print_json(&services.backups.create_snapshot(&user_id).await?),
        Command::CheckSpend {
            user_id,
            amount,
            destination,
        } => print_json(
            &services
                .security
                .check_transaction(&user_id, amount, destination.as_deref())
                .await?,
        ),
        Command::Health => {
            load_helius_keys(app).await;
            let overall = app.health().check_all().await;
            print_json(&serde_json::json!({
                "status": overall,
                "components": app.health().components().await,
            }))
        }
        Command::Errors { limit } => print_json(&services.errors.persisted(limit).await?),
    }
}

async fn load_helius_keys(app: &Application) {
    let services = app.services();
    if let Err(e) = services.helius_keys.refresh().await {
        services.errors.report(&e, "helius.keys").await;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
