//! SecureChat Command-Line Interface
//!
//! A terminal client for end-to-end encrypted two-party messaging through
//! an untrusted relay.

use anyhow::Result;
use clap::{Parser, Subcommand};
use securechat_core::config::DEFAULT_SERVER;
use securechat_core::{ClientConfig, SyncConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// SecureChat - end-to-end encrypted messaging
#[derive(Parser)]
#[command(name = "securechat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Relay server as host:port
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Public key PEM file
    #[arg(long, default_value = "~/.securechat/public.pem")]
    public_key: String,

    /// Private key PEM file
    #[arg(long, default_value = "~/.securechat/private.pem")]
    private_key: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new RSA key pair
    Keygen {
        /// Modulus size in bits
        #[arg(short, long, default_value = "2048")]
        bits: usize,

        /// Overwrite existing key files
        #[arg(short, long)]
        force: bool,
    },

    /// Show the local identity
    Identity,

    /// List chats known to the relay
    Chats,

    /// Show verified history with a correspondent
    History {
        /// Correspondent's modulus (hex)
        modulus: String,

        /// Correspondent's public exponent (hex)
        #[arg(short, long, default_value = "10001")]
        exponent: String,
    },

    /// Send a message
    Send {
        /// Recipient's modulus (hex)
        modulus: String,

        /// Message text
        message: String,

        /// Recipient's public exponent (hex)
        #[arg(short, long, default_value = "10001")]
        exponent: String,
    },

    /// Delete one of your messages
    Delete {
        /// Message id
        id: i64,
    },

    /// Mark a chat as read
    Read {
        /// Correspondent's modulus (hex)
        modulus: String,

        /// Correspondent's public exponent (hex)
        #[arg(short, long, default_value = "10001")]
        exponent: String,
    },

    /// Connect to the realtime channel and follow incoming messages
    Listen {
        /// Focus the chat with this modulus (hex); lines typed on stdin are
        /// sent to it
        #[arg(short, long)]
        with: Option<String>,

        /// Public exponent (hex) of the focused correspondent
        #[arg(short, long, default_value = "10001")]
        exponent: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = ClientConfig {
        server: cli.server,
        public_key_path: PathBuf::from(shellexpand::tilde(&cli.public_key).to_string()),
        private_key_path: PathBuf::from(shellexpand::tilde(&cli.private_key).to_string()),
        sync: SyncConfig::default(),
    };

    let command = cli.command.unwrap_or(Commands::Identity);

    match command {
        Commands::Keygen { bits, force } => {
            commands::keygen(&config, bits, force)?;
        }
        Commands::Identity => {
            commands::show_identity(&config)?;
        }
        Commands::Chats => {
            commands::list_chats(&config).await?;
        }
        Commands::History { modulus, exponent } => {
            commands::show_history(&config, &modulus, &exponent).await?;
        }
        Commands::Send { modulus, message, exponent } => {
            commands::send_message(&config, &modulus, &exponent, &message).await?;
        }
        Commands::Delete { id } => {
            commands::delete_message(&config, id).await?;
        }
        Commands::Read { modulus, exponent } => {
            commands::mark_read(&config, &modulus, &exponent).await?;
        }
        Commands::Listen { with, exponent } => {
            commands::listen(&config, with.as_deref(), &exponent).await?;
        }
    }

    Ok(())
}
