mod config_commands;
mod history_commands;
mod preview_commands;
mod serve;
mod storage;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tocsin_config::TocsinConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tocsin", about = "Tocsin: scheduled HTTP callbacks", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./tocsin.toml and the user config dir).
    #[arg(long, global = true, env = "TOCSIN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and its HTTP API (default when no subcommand is given).
    Serve,
    /// Print the next fire times of a cron expression.
    Preview(preview_commands::PreviewArgs),
    /// Show archived executions from the configured store.
    History(history_commands::HistoryArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the config file (explicit or discovered), then env and flag overrides.
fn load_config(cli: &Cli) -> anyhow::Result<TocsinConfig> {
    let mut config = match &cli.config {
        Some(path) => tocsin_config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => tocsin_config::discover_and_load(),
    };
    tocsin_config::apply_env_overrides(&mut config);

    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match &cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "tocsin starting");
            let config = load_config(&cli)?;
            serve::run(config).await
        },
        Some(Commands::Preview(args)) => preview_commands::handle_preview(args),
        Some(Commands::History(args)) => {
            let config = load_config(&cli)?;
            history_commands::handle_history(&config, args).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
