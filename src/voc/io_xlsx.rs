// Primitives for reading XLSX exports.

use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};
use log::{debug, info};
use snafu::prelude::*;

use crate::voc::io_common::{clean_colname, excel_serial_to_datetime, fractional_day_to_time};
use crate::voc::normalize::{missing_required, resolve_headers};
use crate::voc::{
    EmptyWorkbookSnafu, OpeningWorkbookSnafu, RawTable, SheetMissingSnafu, VocResult,
    HEADER_OFFSETS,
};

/// The sheet names of a workbook.
pub fn sheet_names(path: &Path) -> VocResult<Vec<String>> {
    let display = path.display().to_string();
    let workbook: Xlsx<_> = open_workbook(path).context(OpeningWorkbookSnafu { path: display })?;
    Ok(workbook.sheet_names().to_vec())
}

/// Reads the first worksheet of an export into a raw table, discovering
/// the header row.
pub fn read_xlsx_table(path: &Path) -> VocResult<RawTable> {
    let display = path.display().to_string();
    let mut workbook: Xlsx<_> =
        open_workbook(path).context(OpeningWorkbookSnafu { path: display.clone() })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyWorkbookSnafu { path: display.clone() })?
        .context(OpeningWorkbookSnafu { path: display.clone() })?;
    table_from_range(display, &wrange)
}

/// Reads one named worksheet into a raw table, discovering the header row.
pub fn read_sheet_table(path: &Path, sheet: &str) -> VocResult<RawTable> {
    let display = path.display().to_string();
    let mut workbook: Xlsx<_> =
        open_workbook(path).context(OpeningWorkbookSnafu { path: display.clone() })?;
    let wrange = workbook
        .worksheet_range(sheet)
        .context(SheetMissingSnafu {
            path: display.clone(),
            sheet,
        })?
        .context(OpeningWorkbookSnafu { path: display.clone() })?;
    let source = format!("{}#{}", display, sheet);
    table_from_range(source, &wrange)
}

fn table_from_range(
    source: String,
    wrange: &calamine::Range<calamine::DataType>,
) -> VocResult<RawTable> {
    let all_rows: Vec<Vec<String>> = wrange
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    if all_rows.is_empty() {
        whatever!("{} has no rows", source);
    }

    // The header is not always on the first row. Try a fixed set of
    // offsets in order and keep the first one that resolves every
    // required column; fall back to the least-bad offset, then to the
    // default. The remaining missing columns surface during validation.
    let mut best: Option<(usize, usize)> = None; // (offset, missing count)
    for &offset in HEADER_OFFSETS.iter() {
        if offset >= all_rows.len() {
            break;
        }
        let headers: Vec<String> = all_rows[offset].iter().map(|h| clean_colname(h)).collect();
        let missing = missing_required(&resolve_headers(&headers));
        debug!(
            "table_from_range: {}: offset {} missing {:?}",
            source, offset, missing
        );
        if missing.is_empty() {
            return Ok(at_offset(source, all_rows, offset));
        }
        match best {
            Some((_, n)) if n <= missing.len() => {}
            _ => best = Some((offset, missing.len())),
        }
    }
    let offset = best.map(|(o, _)| o).unwrap_or(0);
    info!(
        "table_from_range: {}: no offset resolves all required columns, using offset {}",
        source, offset
    );
    Ok(at_offset(source, all_rows, offset))
}

fn at_offset(source: String, mut all_rows: Vec<Vec<String>>, offset: usize) -> RawTable {
    let rows = all_rows.split_off(offset + 1);
    let headers: Vec<String> = all_rows
        .last()
        .map(|r| r.iter().map(|h| clean_colname(h)).collect())
        .unwrap_or_default();
    info!(
        "at_offset: {}: header at row {}, {} data rows",
        source,
        offset,
        rows.len()
    );
    RawTable {
        source,
        headers,
        rows,
    }
}

/// Renders a cell as text. Date and time cells are rendered in the
/// canonical formats understood by the lenient parsers; fractional-day
/// values become a plain time of day.
fn cell_to_string(cell: &calamine::DataType) -> String {
    match cell {
        calamine::DataType::String(s) => s.clone(),
        calamine::DataType::Int(i) => i.to_string(),
        calamine::DataType::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        calamine::DataType::Bool(b) => b.to_string(),
        calamine::DataType::DateTime(f) => {
            if *f < 1.0 {
                match fractional_day_to_time(*f) {
                    Some(t) => t.format("%H:%M:%S").to_string(),
                    None => String::new(),
                }
            } else {
                match excel_serial_to_datetime(*f) {
                    Some(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
                    None => String::new(),
                }
            }
        }
        calamine::DataType::Error(_) | calamine::DataType::Empty => String::new(),
    }
}
