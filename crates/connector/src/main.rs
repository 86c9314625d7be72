//! fsconnector
//!
//! Serves one directory tree over authenticated HTTP.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use connector::config::{default_config_path, Config};
use connector::{build_state, logging, ConnectorServer};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated passwords.
const GENERATED_PASSWORD_LEN: usize = 24;

/// fsconnector - serve one directory tree over authenticated HTTP.
#[derive(Parser, Debug)]
#[command(name = "fsconnector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the sandbox until interrupted
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long, short)]
        port: Option<u16>,

        /// Sandbox root (overrides the config file)
        #[arg(long, short, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Write a configuration file with a credential
    Init {
        /// Username clients authenticate with
        #[arg(long, short)]
        username: String,

        /// Password; a random one is generated when omitted
        #[arg(long)]
        password: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the effective configuration with the password masked
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve { port, root } => {
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = root {
                config.sandbox.root = root;
            }
            config.validate()?;

            let _log_guard = logging::init(
                &config.server.log_level,
                cli.verbose,
                config.server.log_dir.as_deref(),
            )?;
            tracing::info!(config = %config_path.display(), "fsconnector starting");

            let state = build_state(&config, &config_path)?;
            let server = ConnectorServer::from_config(&config, state)?;
            server.run(wait_for_shutdown_signal()).await?;
        }
        Commands::Init {
            username,
            password,
            force,
        } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    config_path.display()
                );
            }

            let generated = password.is_none();
            let mut config = Config::default();
            config.auth.username = username;
            config.auth.password = password.unwrap_or_else(generate_password);
            config.validate()?;
            config
                .save(&config_path)
                .with_context(|| format!("Failed to initialize {}", config_path.display()))?;

            println!("Wrote {}", config_path.display());
            if generated {
                println!("Generated password: {}", config.auth.password);
            }
        }
        Commands::ShowConfig => {
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            println!("# {}", config_path.display());
            print!("{}", config.masked().to_toml()?);
        }
    }

    Ok(())
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                tracing::warn!("Failed to register signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}
