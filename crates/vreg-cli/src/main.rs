//! # Vreg CLI
//!
//! Command-line interface for searching and editing vehicle registration
//! records kept in a JSON record file.
//!
//! ## Commands
//!
//! - `vreg query <text>` - Ranked search over the records
//! - `vreg status` - Record counts, index and cache statistics
//! - `vreg add` - Create a record
//! - `vreg update <id>` - Patch a record
//! - `vreg delete <id>` - Delete a record
//! - `vreg watch` - Refresh periodically and report changes
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a vehicle
//! vreg add --plate ABC-4567 --applicant "Alice Wang" --phone 0912345678
//!
//! # Substring and subsequence search
//! vreg query bc
//! vreg query a4 --output json
//!
//! # Approve it
//! vreg update rec-1 --status approved
//! ```

mod app;
mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vreg_core::ApprovalStatus;

/// Vreg - Instant search over vehicle registration records
#[derive(Parser)]
#[command(name = "vreg")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Record file to use instead of the configured one
    #[arg(short, long, global = true, env = "VREG_DATA")]
    data: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search records
    Query {
        /// Search text (plate, applicant, department, brand, ...)
        text: String,

        /// Maximum number of results to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show record and index statistics
    Status,

    /// Create a record
    Add {
        #[command(flatten)]
        fields: commands::add::AddArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Update fields of an existing record
    Update {
        /// Record identifier
        id: String,

        /// New approval status (pending, approved, rejected)
        #[arg(short, long)]
        status: Option<ApprovalStatus>,

        #[arg(long)]
        plate: Option<String>,

        #[arg(long)]
        applicant: Option<String>,

        #[arg(long)]
        vehicle_type: Option<String>,

        #[arg(long)]
        identity_type: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        brand: Option<String>,

        #[arg(long)]
        color: Option<String>,

        /// Application date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Delete a record
    Delete {
        /// Record identifier
        id: String,
    },

    /// Refresh periodically and report changes until interrupted
    Watch,
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => vreg_core::Config::load_from(path)?,
        None => vreg_core::Config::load()?,
    };
    if let Some(data) = cli.data {
        config.general.data_file = Some(data);
    }

    // Setup logging
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Query {
            text,
            limit,
            output,
        } => commands::query::run(config, &text, limit, output),
        Commands::Status => commands::status::run(config),
        Commands::Add { fields, output } => commands::add::run(config, fields, output),
        Commands::Update {
            id,
            status,
            plate,
            applicant,
            vehicle_type,
            identity_type,
            phone,
            department,
            brand,
            color,
            date,
        } => {
            let patch = vreg_core::RecordPatch {
                plate,
                applicant_name: applicant,
                vehicle_type,
                identity_type,
                contact_phone: phone,
                department,
                brand,
                color,
                application_date: date,
                approval_status: status,
            };
            commands::update::run(config, &id, patch)
        }
        Commands::Delete { id } => commands::delete::run(config, &id),
        Commands::Watch => commands::watch::run(config),
    }
}
