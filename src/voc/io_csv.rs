// Primitives for reading CSV exports.

use std::fs;
use std::path::Path;

use log::{debug, info};
use snafu::prelude::*;

use crate::voc::io_common::clean_colname;
use crate::voc::{
    CsvReadSnafu, EncodingFallbackExhaustedSnafu, IoSnafu, RawTable, VocResult,
};

/// Reads a CSV export into a raw table. The first row is the header.
///
/// The bytes are decoded as UTF-8 (byte-order-mark aware) first, then as
/// EUC-KR, to tolerate exports saved from different locales.
pub fn read_csv_table(path: &Path) -> VocResult<RawTable> {
    let display = path.display().to_string();
    let bytes = fs::read(path).context(IoSnafu { path: display.clone() })?;
    let text = decode_with_fallback(&bytes, &display)?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for line_r in rdr.records() {
        let line = line_r.context(CsvReadSnafu { path: display.clone() })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    if rows.is_empty() {
        whatever!("{} is empty", display);
    }
    let headers: Vec<String> = rows.remove(0).iter().map(|h| clean_colname(h)).collect();
    debug!("read_csv_table: {}: headers {:?}", display, headers);
    info!("read_csv_table: {}: {} data rows", display, rows.len());
    Ok(RawTable {
        source: display,
        headers,
        rows,
    })
}

fn decode_with_fallback(bytes: &[u8], path: &str) -> VocResult<String> {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    debug!("decode_with_fallback: {}: not valid UTF-8, trying EUC-KR", path);
    let (text, _, had_errors) = encoding_rs::EUC_KR.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    EncodingFallbackExhaustedSnafu { path }.fail()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn utf8_with_bom_is_read_directly() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("날짜,기업명\n2026-01-05,Acme\n".as_bytes());
        let f = write_temp(&bytes);
        let table = read_csv_table(f.path()).unwrap();
        assert_eq!(table.headers, vec!["날짜", "기업명"]);
        assert_eq!(table.rows, vec![vec!["2026-01-05", "Acme"]]);
    }

    #[test]
    fn legacy_encoded_files_fall_back_to_euc_kr() {
        let (encoded, _, had_errors) = encoding_rs::EUC_KR.encode("날짜,기업명\n2026-01-05,한빛\n");
        assert!(!had_errors);
        let f = write_temp(&encoded);
        let table = read_csv_table(f.path()).unwrap();
        assert_eq!(table.headers, vec!["날짜", "기업명"]);
        assert_eq!(table.rows[0][1], "한빛");
    }

    #[test]
    fn undecodable_bytes_exhaust_the_fallbacks() {
        // 0xFF is invalid as a lead byte in both encodings.
        let f = write_temp(&[0xFF, 0xFF, 0xFE, 0x00, 0x80, 0xFF]);
        let err = read_csv_table(f.path()).unwrap_err();
        assert!(err.to_string().contains("decoded"), "{}", err);
    }
}
