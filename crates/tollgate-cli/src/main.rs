//! Tollgate command line.
//!
//! # Quick Start
//!
//! ```bash
//! # Serve the API with verification off and automatic approval
//! tollgate serve --dev
//!
//! # Mint a token for a user, and one for an operator
//! tollgate token --subject arnold --email arnold@example.com
//! tollgate token --subject ops --email ops@example.com --role admin
//!
//! # Print the effective configuration
//! tollgate config
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Tollgate - gated onboarding for multi-tenant platforms.
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding tollgate.toml and tollgate.local.toml.
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve {
        /// Address to bind to, overriding the configuration.
        #[arg(short, long)]
        address: Option<String>,

        /// Development mode (no verification, automatic approval).
        #[arg(long)]
        dev: bool,
    },

    /// Mint a bearer token signed with the configured secret.
    Token {
        /// Subject claim.
        #[arg(short, long)]
        subject: String,

        /// Email claim.
        #[arg(short, long)]
        email: String,

        /// Preferred username; defaults to the subject.
        #[arg(short, long)]
        username: Option<String>,

        /// Roles to grant (repeatable).
        #[arg(short, long = "role")]
        roles: Vec<String>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let dir = cli.dir.as_deref();

    match cli.command {
        Commands::Serve { address, dev } => commands::serve::run(dir, address, dev),
        Commands::Token {
            subject,
            email,
            username,
            roles,
        } => commands::token::run(dir, &subject, &email, username, roles),
        Commands::Config => commands::config::run(dir),
    }
}
