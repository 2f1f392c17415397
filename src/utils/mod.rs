//! Utility functions and helpers used throughout the application
//!
//! Telemetry setup, command line arguments and time helpers.

pub mod time;

/// Telemetry and observability utilities
pub mod telemetry {
    use anyhow::Result;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    /// Initialize global tracing with the specified log level and format
    pub fn init(log_level: &str, log_format: &str) -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let registry = Registry::default().with(env_filter);

        match log_format {
            "json" => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?,
            "compact" => registry
                .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
                .try_init()?,
            _ => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?,
        }

        Ok(())
    }

    /// Initialize logging to stderr plus a daily-rotated file
    ///
    /// The returned guard must be held for the life of the process or buffered
    /// lines are lost.
    pub fn init_with_file_rotation(
        log_level: &str,
        log_format: &str,
        log_directory: &str,
        file_name_prefix: &str,
    ) -> Result<WorkerGuard> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_directory, file_name_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let registry = Registry::default().with(env_filter);

        match log_format {
            "json" => registry
                .with(fmt::layer().json().with_writer(non_blocking).with_target(true))
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()?,
            _ => registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true))
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()?,
        }

        Ok(guard)
    }
}

/// Command line argument definitions
pub mod cli {
    use clap::{Parser, Subcommand};

    /// Command line arguments for the dashboard backend
    #[derive(Parser, Debug, Clone)]
    #[command(
        name = "dashboard",
        about = "Solana trading dashboard backend: wallets, transactions, bots and API vault",
        version = env!("CARGO_PKG_VERSION")
    )]
    pub struct CliArgs {
        /// Path to configuration file
        #[arg(short, long = "config", env = "CONFIG_PATH", global = true)]
        pub config_path: Option<String>,

        /// Logging level (trace, debug, info, warn, error)
        #[arg(short, long, env = "LOG_LEVEL", global = true)]
        pub log_level: Option<String>,

        /// Log format (json, pretty, compact)
        #[arg(long, env = "LOG_FORMAT", global = true)]
        pub log_format: Option<String>,

        /// Environment (development, staging, production)
        #[arg(short, long, env = "ENVIRONMENT", global = true)]
        pub environment: Option<String>,

        /// Use the in-memory table store instead of Supabase
        #[arg(long, global = true)]
        pub offline: bool,

        /// Enable the Prometheus exporter
        #[arg(long, env = "ENABLE_METRICS", global = true)]
        pub enable_metrics: bool,

        /// Command to run; defaults to `serve`
        #[command(subcommand)]
        pub command: Option<Command>,
    }

    /// Dashboard commands
    #[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
    pub enum Command {
        /// Run background tasks (key refresh, health checks) until interrupted
        Serve,
        /// Show SOL and token balances for a wallet
        Portfolio {
            /// Wallet address
            address: String,
        },
        /// Show merged transaction history for a wallet
        Transactions {
            /// Wallet address
            address: String,
            /// Maximum number of rows
            #[arg(long, default_value_t = 50)]
            limit: usize,
        },
        /// List a user's bots
        Bots {
            /// User id
            user_id: String,
        },
        /// Look up token prices by mint
        Prices {
            /// Token mint addresses
            #[arg(required = true)]
            mints: Vec<String>,
        },
        /// Snapshot a user's dashboard data to the local store
        Backup {
            /// User id
            user_id: String,
        },
        /// Check whether a transfer would pass the spend limit
        CheckSpend {
            /// User id
            user_id: String,
            /// Amount in SOL
            amount: rust_decimal::Decimal,
            /// Destination address
            #[arg(long)]
            destination: Option<String>,
        },
        /// Probe the database, RPC endpoint and Helius keys once
        Health,
        /// Show recently reported errors
        Errors {
            /// Maximum number of entries
            #[arg(long, default_value_t = 20)]
            limit: usize,
        },
    }

    impl CliArgs {
        /// Selected command, `serve` when none was given
        pub fn command(&self) -> Command {
            self.command.clone().unwrap_or(Command::Serve)
        }
    }
}

pub use cli::{CliArgs, Command};
