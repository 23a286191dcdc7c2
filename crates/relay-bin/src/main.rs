//! Telemetry Relay - buffers sensor readings and forwards them to the ingest endpoint.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, Config, Paths};

/// Telemetry relay command-line interface.
#[derive(Parser)]
#[command(name = "telemetry-relay")]
#[command(about = "Durable relay from MQTT sensor messages to the ingest endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, stores and logs. Defaults to ~/.telemetry-relay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the listener, batch sender and sweeper until interrupted
    Run,
    /// Print entry counts of the three stores
    Status,
    /// Run one sweep pass immediately
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            paths.ensure_dirs()?;
            init_logging(&config.log_level, Some(&paths.log_file()))?;
            app::run_relay(config, paths).await?;
        }
        Commands::Status => {
            init_logging(&config.log_level, None)?;
            app::print_status(&paths)?;
        }
        Commands::Sweep => {
            init_logging(&config.log_level, None)?;
            app::sweep_now(&config, &paths).await?;
        }
    }

    Ok(())
}
