//! Command-line argument parsing

use clap::{Args as ClapArgs, Parser, Subcommand};
use odv_core::{FileType, LinkPermission};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "odv",
    about = "ODV report archive operator tool",
    version,
    long_about = "Renders meeting reports from generated text and manages the \
                  OneDrive archive where reports, transcripts and audio are stored."
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/odv.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: Option<String>,

    /// Enable JSON log format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Work against an in-memory archive instead of OneDrive
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fill the report template with generated text
    Render(RenderArgs),

    /// Show the archive folder of every file type
    Paths {
        /// Client the folders belong to
        #[arg(long)]
        client: Option<String>,
    },

    /// Create an archive folder path if missing
    Ensure {
        /// `/`-separated folder path
        #[arg(long)]
        path: String,
    },

    /// Upload a file to its archive folder
    Upload {
        #[arg(long)]
        file: PathBuf,

        /// audio, transcript, report or document
        #[arg(long = "type", default_value = "document")]
        file_type: FileType,

        #[arg(long)]
        client: Option<String>,

        /// Also create an organization share link (view or edit)
        #[arg(long, value_parser = parse_permission)]
        share: Option<LinkPermission>,
    },

    /// Check credentials and drive access
    Health,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RenderArgs {
    /// File with the generated report text (HTML or plain text)
    #[arg(long)]
    pub report: PathBuf,

    /// Template to fill, defaults to the configured one
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Output `.docx` file
    #[arg(long, required_unless_present = "archive")]
    pub out: Option<PathBuf>,

    /// Upload the rendered report to the archive
    #[arg(long)]
    pub archive: bool,

    /// Client the report belongs to when archiving
    #[arg(long, requires = "archive")]
    pub client: Option<String>,

    #[arg(long)]
    pub number: u32,

    /// Meeting date, YYYY-MM-DD
    #[arg(long)]
    pub meeting_date: String,

    #[arg(long, default_value = "")]
    pub start_time: String,

    #[arg(long, default_value = "")]
    pub end_time: String,

    #[arg(long, default_value = "")]
    pub location: String,

    #[arg(long, default_value = "")]
    pub verification: String,
}

fn parse_permission(value: &str) -> Result<LinkPermission, String> {
    match value.trim().to_lowercase().as_str() {
        "view" => Ok(LinkPermission::View),
        "edit" => Ok(LinkPermission::Edit),
        other => Err(format!("unknown permission '{other}', expected view or edit")),
    }
}
