use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Turns raw customer-inquiry exports into a queryable master table and
/// JSON dashboard reports.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// The directory holding the master table and its metadata.
    #[clap(long, value_parser, default_value = "data")]
    pub data_dir: PathBuf,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validates per-channel exports and replaces the master table.
    Ingest(IngestArgs),
    /// Writes a JSON report over a filtered view of the master table.
    Report(ReportArgs),
    /// Prints the state of the master table.
    Status,
    /// Deletes the master table and its metadata.
    Reset {
        /// The admin token. Also read from the VOCDASH_ADMIN_TOKEN environment variable.
        #[clap(long, value_parser)]
        token: Option<String>,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct IngestArgs {
    /// (file paths) Exports of phone inquiries, CSV or XLSX. May be repeated.
    #[clap(long, value_parser)]
    pub phone: Vec<PathBuf>,

    /// (file paths) Exports of chat inquiries, CSV or XLSX. May be repeated.
    #[clap(long, value_parser)]
    pub chat: Vec<PathBuf>,

    /// (file paths) Exports of board inquiries, CSV or XLSX. May be repeated.
    #[clap(long, value_parser)]
    pub board: Vec<PathBuf>,

    /// (file path) A single workbook holding one worksheet per channel.
    #[clap(long, value_parser)]
    pub workbook: Option<PathBuf>,

    /// The admin token guarding writes. Overridden by the
    /// VOCDASH_ADMIN_TOKEN environment variable when that is set.
    #[clap(long, value_parser)]
    pub token: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ReportArgs {
    /// (query string) A saved filter state, as printed in a previous
    /// report under "filters". Explicit flags below override it.
    #[clap(long, value_parser)]
    pub query: Option<String>,

    /// (YYYY-MM-DD) Start of the date range, inclusive.
    #[clap(long, value_parser)]
    pub start: Option<String>,

    /// (YYYY-MM-DD) End of the date range, inclusive.
    #[clap(long, value_parser)]
    pub end: Option<String>,

    /// (comma-separated list) Channels to include, e.g. "phone,chat".
    #[clap(long, value_parser)]
    pub channels: Option<String>,

    /// Keep only inquiries from this company.
    #[clap(long, value_parser)]
    pub company: Option<String>,

    /// Keep only inquiries with this major category.
    #[clap(long, value_parser)]
    pub major: Option<String>,

    /// Keep only inquiries with this mid category.
    #[clap(long, value_parser)]
    pub mid: Option<String>,

    /// Keep only inquiries with this minor category.
    #[clap(long, value_parser)]
    pub minor: Option<String>,

    /// (day, week or month) The bucketing unit of the trend section.
    #[clap(long, value_parser, default_value = "month")]
    pub unit: String,

    /// How many entries to keep in each ranking.
    #[clap(long, value_parser, default_value_t = 10)]
    pub top: usize,

    /// (file path, 'stdout' or empty) Where to write the report.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference report in JSON format. If provided, vocdash
    /// will check that the generated report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,
}
