//! Blinky CLI
//!
//! Command-line interface for Blinky - sections of links, stored locally or
//! in the cloud once signed in.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blinky_core::{Config, SectionStore};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "blinky")]
#[command(about = "Blinky - Sections of links, local or in the cloud")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug output to stderr (or the configured log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage sections
    Section {
        #[command(subcommand)]
        command: SectionCommands,
    },
    /// Manage links inside a section
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
    /// Sign in or out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show storage mode and contents
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum SectionCommands {
    /// List all sections
    #[command(alias = "ls")]
    List,
    /// Show a section and its links
    Show {
        /// Section id, title, or id prefix
        section: String,
    },
    /// Create a new section
    #[command(alias = "create")]
    Add {
        /// Section title
        title: String,
        /// Derive the id from the title instead of generating one
        #[arg(long)]
        slug: bool,
    },
    /// Rename a section
    Rename {
        /// Section id, title, or id prefix
        section: String,
        /// New title
        title: String,
    },
    /// Delete a section and its links
    #[command(alias = "rm")]
    Delete {
        /// Section id, title, or id prefix
        section: String,
    },
}

#[derive(Subcommand)]
enum LinkCommands {
    /// Add a link to a section
    Add {
        /// Section id, title, or id prefix
        section: String,
        /// URL to save (https:// is assumed when omitted)
        url: String,
        /// Display name (defaults to the site name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a link from a section
    #[command(alias = "rm")]
    Remove {
        /// Section id, title, or id prefix
        section: String,
        /// Link index as shown by `section show`
        index: usize,
    },
    /// Rename a link
    Rename {
        /// Section id, title, or id prefix
        section: String,
        /// Link index as shown by `section show`
        index: usize,
        /// New display name
        name: String,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Sign in and merge local sections into the cloud
    SignIn {
        /// User id
        user: String,
    },
    /// Sign out and return to local sections
    SignOut,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_db, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let mut config = Config::load().context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    // Commands that don't need the store
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, &output)
            }
        };
    }

    let store = SectionStore::open(&config).context("Failed to open section storage")?;

    commands::auth::resume(&store, &config).await?;

    if let Commands::Auth { command } = cli.command {
        let config_path = Config::config_file_path();
        return match command {
            AuthCommands::SignIn { user } => {
                commands::auth::sign_in(&store, &mut config, &config_path, user, &output).await
            }
            AuthCommands::SignOut => {
                commands::auth::sign_out(&store, &mut config, &config_path, &output).await
            }
        };
    }

    match cli.command {
        Commands::Section { command } => handle_section_command(command, &store, &output).await,
        Commands::Link { command } => handle_link_command(command, &store, &output).await,
        Commands::Status => commands::status::show(&store, &config, &output).await,
        Commands::Auth { .. } | Commands::Config { .. } => Ok(()), // Handled above
    }
}

async fn handle_section_command(
    command: SectionCommands,
    store: &SectionStore,
    output: &Output,
) -> Result<()> {
    match command {
        SectionCommands::List => commands::section::list(store, output).await,
        SectionCommands::Show { section } => commands::section::show(store, section, output).await,
        SectionCommands::Add { title, slug } => {
            commands::section::add(store, title, slug, output).await
        }
        SectionCommands::Rename { section, title } => {
            commands::section::rename(store, section, title, output).await
        }
        SectionCommands::Delete { section } => {
            commands::section::delete(store, section, output).await
        }
    }
}

async fn handle_link_command(
    command: LinkCommands,
    store: &SectionStore,
    output: &Output,
) -> Result<()> {
    match command {
        LinkCommands::Add { section, url, name } => {
            commands::link::add(store, section, url, name, output).await
        }
        LinkCommands::Remove { section, index } => {
            commands::link::remove(store, section, index, output).await
        }
        LinkCommands::Rename {
            section,
            index,
            name,
        } => commands::link::rename(store, section, index, name, output).await,
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug and the
/// default is warnings only. Output goes to `log_file` when configured.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("blinky_core={},blinky_cli={}", level, level)));

    let log_file = config.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                None
            }
        }
    });

    // Ignore error if already initialized
    match log_file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(file)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
