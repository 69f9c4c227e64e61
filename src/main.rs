//! CLI entry point for the mDNS chat node.
//!
//! Runs a chat node on the local network and manages its configuration
//! file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use mdns_chat::{
    utils::{ChatConfig, Console, DEFAULT_CONFIG_FILE},
    App,
};
use std::path::PathBuf;
use tokio::signal;

/// mDNS Chat - peer-to-peer chat on the local network
#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "A peer-to-peer chat node discovering its peers with mDNS")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat node (the default)
    Run {
        /// Multiaddr to listen on, replaces the configured addresses
        #[arg(short, long)]
        listen: Vec<String>,
        /// Give up on a latency probe after this many seconds
        #[arg(long, value_name = "SECS")]
        probe_timeout: Option<u64>,
        /// Disable mDNS discovery
        #[arg(long)]
        no_mdns: bool,
        /// Print received messages without color
        #[arg(long)]
        no_color: bool,
    },
    /// Generate and validate configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = ChatConfig::load(cli.config.as_deref())?;

    // Initialize logging
    setup_logging(cli.verbose, cli.quiet, &config.logging.level);

    match cli.command.unwrap_or(Commands::Run {
        listen: Vec::new(),
        probe_timeout: None,
        no_mdns: false,
        no_color: false,
    }) {
        Commands::Run {
            listen,
            probe_timeout,
            no_mdns,
            no_color,
        } => handle_run_command(listen, probe_timeout, no_mdns, no_color, config).await,
        Commands::Config { action } => handle_config_commands(action, &config),
    }
}

fn setup_logging(verbose: u8, quiet: bool, configured: &str) {
    let log_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();
}

async fn handle_run_command(
    listen: Vec<String>,
    probe_timeout: Option<u64>,
    no_mdns: bool,
    no_color: bool,
    mut config: ChatConfig,
) -> Result<()> {
    // Override config with command line options
    if !listen.is_empty() {
        config.network.listen_addresses = listen;
    }
    if probe_timeout.is_some() {
        config.protocol.probe_timeout_secs = probe_timeout;
    }
    if no_mdns {
        config.network.enable_mdns = false;
    }
    if no_color {
        config.console.color = false;
    }

    info!("Listen addresses: {:?}", config.network.listen_addresses);
    info!("mDNS discovery: {}", config.network.enable_mdns);

    let console = Console::stdio(config.console.color);
    let app = App::new(config, console)?;
    let handle = app.handle();

    tokio::select! {
        result = app.run() => {
            if let Err(e) = result {
                error!("Application error: {}", e);
                return Err(e.into());
            }
        }
        result = signal::ctrl_c() => {
            result?;
            info!("Shutting down gracefully...");
            handle.shutdown().await;
        }
    }

    Ok(())
}

fn handle_config_commands(action: ConfigCommands, config: &ChatConfig) -> Result<()> {
    match action {
        ConfigCommands::Generate { output } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

            ChatConfig::default().save(&output_path)?;
            println!("✓ Configuration generated: {}", output_path.display());
        }
        ConfigCommands::Validate { file } => {
            let config_to_validate = if let Some(path) = file {
                ChatConfig::from_file(path)?
            } else {
                config.clone()
            };

            config_to_validate.validate()?;
            println!("✓ Configuration is valid");
        }
        ConfigCommands::Show => {
            println!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}
