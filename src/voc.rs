use log::{info, warn};

use snafu::{prelude::*, Snafu};

use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use voc_insights::{Channel, InquiryRecord};

use crate::args::{Args, Command, IngestArgs};
use crate::voc::store::{MasterMeta, MasterStore};

pub mod io_common;
pub mod io_csv;
pub mod io_xlsx;
pub mod normalize;
pub mod report;
pub mod store;

/// The canonical columns every upload must resolve to.
pub const REQUIRED_COLUMNS: [&str; 5] = ["date", "company", "major", "mid", "minor"];

/// Row offsets probed when discovering the header row of a worksheet.
pub const HEADER_OFFSETS: [usize; 4] = [0, 1, 2, 3];

const ADMIN_TOKEN_VAR: &str = "VOCDASH_ADMIN_TOKEN";
const DEFAULT_ADMIN_TOKEN: &str = "15886559";

#[derive(Debug, Snafu)]
pub enum VocError {
    #[snafu(display("error opening workbook {path}"))]
    OpeningWorkbook {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("{path} has no worksheets"))]
    EmptyWorkbook { path: String },
    #[snafu(display("{path} has no worksheet named {sheet}"))]
    SheetMissing { path: String, sheet: String },
    #[snafu(display(
        "{source_name} ({channel}): missing required columns {:?}, found {:?}",
        missing,
        found
    ))]
    MissingColumns {
        channel: String,
        source_name: String,
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[snafu(display("{path} could not be decoded as UTF-8 or EUC-KR"))]
    EncodingFallbackExhausted { path: String },
    #[snafu(display("error reading CSV {path}"))]
    CsvRead { source: csv::Error, path: String },
    #[snafu(display("error accessing {path}"))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("error writing master workbook {path}"))]
    WritingMaster {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display(""))]
    ParsingMeta { source: serde_json::Error },
    #[snafu(display("admin token mismatch"))]
    AdminTokenMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type VocResult<T> = Result<T, VocError>;

/// A spreadsheet read into memory as text, before normalization.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawTable {
    /// Where the table came from, for messages.
    pub source: String,
    /// Cleaned header names, not yet alias-resolved.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The admin token in force: the `VOCDASH_ADMIN_TOKEN` environment
/// variable when set and non-blank, the built-in default otherwise.
pub fn admin_token() -> String {
    match env::var(ADMIN_TOKEN_VAR) {
        Ok(t) if !t.trim().is_empty() => t,
        _ => DEFAULT_ADMIN_TOKEN.to_string(),
    }
}

/// Checks a provided token against the one in force. Exact equality, no
/// trimming on the provided side.
pub fn check_admin(provided: Option<&str>) -> VocResult<()> {
    match provided {
        Some(t) if t == admin_token() => Ok(()),
        _ => AdminTokenMismatchSnafu {}.fail(),
    }
}

/// Reads a spreadsheet by extension: `.csv` through the CSV reader,
/// everything else through the XLSX reader.
pub fn read_any(path: &Path) -> VocResult<RawTable> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        io_csv::read_csv_table(path)
    } else {
        io_xlsx::read_xlsx_table(path)
    }
}

fn gather_channel_files(
    channel: Channel,
    paths: &[PathBuf],
    records: &mut Vec<InquiryRecord>,
    errors: &mut Vec<VocError>,
) {
    for path in paths {
        info!(
            "ingest: reading {} as channel {}",
            path.display(),
            channel.label()
        );
        match read_any(path).and_then(|t| normalize::normalize_channel(&t, channel)) {
            Ok(mut recs) => records.append(&mut recs),
            Err(e) => errors.push(e),
        }
    }
}

/// Ingests a combined workbook holding one worksheet per channel.
///
/// A missing channel worksheet stops the workbook, but the error is
/// collected with the rest of the batch rather than aborting it; a
/// worksheet that fails validation is collected like any other file.
fn gather_workbook(path: &Path, records: &mut Vec<InquiryRecord>, errors: &mut Vec<VocError>) {
    let names = match io_xlsx::sheet_names(path) {
        Ok(names) => names,
        Err(e) => {
            errors.push(e);
            return;
        }
    };
    for &channel in Channel::ALL.iter() {
        let sheet = names
            .iter()
            .find(|n| Channel::parse_label(n) == Some(channel))
            .cloned();
        let sheet = match sheet {
            Some(s) => s,
            None => {
                errors.push(
                    SheetMissingSnafu {
                        path: path.display().to_string(),
                        sheet: channel.label(),
                    }
                    .build(),
                );
                return;
            }
        };
        match io_xlsx::read_sheet_table(path, &sheet)
            .and_then(|t| normalize::normalize_channel(&t, channel))
        {
            Ok(mut recs) => records.append(&mut recs),
            Err(e) => errors.push(e),
        }
    }
}

/// Ingests the given uploads and replaces the master table.
///
/// All-or-nothing: if any input fails to decode or validate, every
/// failure is reported and the master is left untouched.
pub fn run_ingest(data_dir: &Path, ingest: &IngestArgs) -> VocResult<()> {
    check_admin(ingest.token.as_deref())?;
    if ingest.phone.is_empty()
        && ingest.chat.is_empty()
        && ingest.board.is_empty()
        && ingest.workbook.is_none()
    {
        whatever!("no input files given");
    }
    let started = Instant::now();

    let mut records: Vec<InquiryRecord> = Vec::new();
    let mut errors: Vec<VocError> = Vec::new();
    gather_channel_files(Channel::Phone, &ingest.phone, &mut records, &mut errors);
    gather_channel_files(Channel::Chat, &ingest.chat, &mut records, &mut errors);
    gather_channel_files(Channel::Board, &ingest.board, &mut records, &mut errors);
    if let Some(workbook) = &ingest.workbook {
        gather_workbook(workbook, &mut records, &mut errors);
    }

    if !errors.is_empty() {
        for e in errors.iter() {
            warn!("ingest: {}", e);
        }
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        whatever!(
            "{} input(s) failed; the master table was not saved:\n  {}",
            errors.len(),
            details.join("\n  ")
        );
    }

    let store = MasterStore::new(data_dir);
    let meta = MasterMeta {
        updated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        rows: records.len() as u64,
        save_seconds: started.elapsed().as_secs_f64(),
    };
    let path = store.save(&records, &meta)?;

    println!("saved {} rows to {}", records.len(), path.display());
    for &channel in Channel::ALL.iter() {
        let count = records.iter().filter(|r| r.channel == channel).count();
        println!("  {}: {} rows", channel.label(), count);
    }
    Ok(())
}

fn run_status(data_dir: &Path) -> VocResult<()> {
    let store = MasterStore::new(data_dir);
    match store.load_meta()? {
        Some(meta) => println!(
            "master: {} rows, updated {} (saved in {:.2}s)",
            meta.rows, meta.updated_at, meta.save_seconds
        ),
        None => println!("master: no metadata"),
    }
    match store.load_table()? {
        Some(records) => {
            for &channel in Channel::ALL.iter() {
                let count = records.iter().filter(|r| r.channel == channel).count();
                println!("  {}: {} rows", channel.label(), count);
            }
            let dates: Vec<_> = records.iter().map(|r| r.date.date()).collect();
            if let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) {
                println!("  dates: {} .. {}", min, max);
            }
        }
        None => println!("master: no data"),
    }
    Ok(())
}

pub fn run_command(args: &Args) -> VocResult<()> {
    match &args.command {
        Command::Ingest(ingest) => run_ingest(&args.data_dir, ingest),
        Command::Report(rargs) => report::run_report(&args.data_dir, rargs),
        Command::Status => run_status(&args.data_dir),
        Command::Reset { token } => {
            check_admin(token.as_deref())?;
            MasterStore::new(&args.data_dir).reset()?;
            println!("master cleared");
            Ok(())
        }
    }
}
