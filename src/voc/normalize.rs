// Column normalization: alias resolution, validation and row parsing.

use std::collections::HashMap;

use log::{debug, info, warn};

use voc_insights::{Channel, InquiryRecord};

use crate::voc::io_common::{clean_cell, clean_colname, parse_date_lenient, parse_time_lenient};
use crate::voc::{MissingColumnsSnafu, RawTable, VocResult, REQUIRED_COLUMNS};

/// The closed alias table: known synonym headers from the upstream
/// exports, rewritten to the canonical names. Matching is exact after
/// cleaning; canonical names pass through unchanged, so resolution is
/// idempotent.
pub fn column_alias(cleaned: &str) -> &str {
    match cleaned {
        "날짜" | "문의일" | "접수일" | "등록일" | "일자" | "날 짜" | "일시" => "date",
        "기업명" | "기업" | "회사" | "회사명" | "고객사" | "법인명" => "company",
        "대분류" | "대분류명" | "대 분류" => "major",
        "중분류" | "중분류명" | "중 분류" => "mid",
        "소분류" | "소분류명" | "소 분류" => "minor",
        "채널" | "경로" | "채널명" => "channel",
        "시간" | "접수시간" | "등록시간" => "time",
        other => other,
    }
}

/// Cleans and alias-resolves a header row.
pub fn resolve_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| column_alias(&clean_colname(h)).to_string())
        .collect()
}

/// The required canonical columns absent from a resolved header row.
pub fn missing_required(resolved: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|c| !resolved.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect()
}

// First occurrence wins when a resolved name appears twice.
fn column_index(resolved: &[String]) -> HashMap<&str, usize> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (idx, name) in resolved.iter().enumerate() {
        index.entry(name.as_str()).or_insert(idx);
    }
    index
}

/// Normalizes an uploaded raw table into inquiry records tagged with the
/// given channel.
///
/// Fails with `MissingColumns` when a required column cannot be resolved;
/// rows whose date does not parse are dropped silently.
pub fn normalize_channel(table: &RawTable, channel: Channel) -> VocResult<Vec<InquiryRecord>> {
    let resolved = resolve_headers(&table.headers);
    let missing = missing_required(&resolved);
    if !missing.is_empty() {
        return MissingColumnsSnafu {
            channel: channel.label(),
            source_name: table.source.clone(),
            missing,
            found: resolved,
        }
        .fail();
    }
    let index = column_index(&resolved);
    let records = build_records(table, &index, |_| Some(channel));
    Ok(records)
}

/// Normalizes a persisted master table, reading the channel of each row
/// from its `channel` column.
pub fn normalize_master(table: &RawTable) -> VocResult<Vec<InquiryRecord>> {
    let resolved = resolve_headers(&table.headers);
    let mut missing = missing_required(&resolved);
    if !resolved.iter().any(|h| h == "channel") {
        missing.push("channel".to_string());
    }
    if !missing.is_empty() {
        return MissingColumnsSnafu {
            channel: "master",
            source_name: table.source.clone(),
            missing,
            found: resolved,
        }
        .fail();
    }
    let index = column_index(&resolved);
    let channel_idx = index["channel"];
    let records = build_records(table, &index, |row| {
        let label = row.get(channel_idx).map(|s| s.as_str()).unwrap_or("");
        let ch = Channel::parse_label(label);
        if ch.is_none() {
            warn!("normalize_master: dropping row with unknown channel {:?}", label);
        }
        ch
    });
    Ok(records)
}

fn build_records<F>(
    table: &RawTable,
    index: &HashMap<&str, usize>,
    channel_of: F,
) -> Vec<InquiryRecord>
where
    F: Fn(&[String]) -> Option<Channel>,
{
    let date_idx = index["date"];
    let time_idx = index.get("time").copied();
    let field = |row: &[String], name: &str| -> Option<String> {
        row.get(index[name]).and_then(|s| clean_cell(s))
    };

    let mut records: Vec<InquiryRecord> = Vec::new();
    let mut dropped = 0usize;
    for row in table.rows.iter() {
        let raw_date = row.get(date_idx).map(|s| s.as_str()).unwrap_or("");
        let date = match parse_date_lenient(raw_date) {
            Some(d) => d,
            None => {
                debug!(
                    "build_records: {}: dropping row with unparseable date {:?}",
                    table.source, raw_date
                );
                dropped += 1;
                continue;
            }
        };
        // A separate time-of-day column, when present, overrides the
        // time part of the date.
        let date = match time_idx
            .and_then(|idx| row.get(idx))
            .and_then(|s| parse_time_lenient(s))
        {
            Some(t) => date.date().and_time(t),
            None => date,
        };
        let channel = match channel_of(row) {
            Some(ch) => ch,
            None => {
                dropped += 1;
                continue;
            }
        };
        records.push(InquiryRecord {
            date,
            company: field(row, "company"),
            category_major: field(row, "major"),
            category_mid: field(row, "mid"),
            category_minor: field(row, "minor"),
            channel,
        });
    }
    info!(
        "build_records: {}: {} records, {} rows dropped",
        table.source,
        records.len(),
        dropped
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voc::RawTable;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            source: "test.xlsx".to_string(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn korean_aliases_resolve_to_canonical_names() {
        let resolved = resolve_headers(&[
            "접수일".to_string(),
            "회사명".to_string(),
            "대분류명".to_string(),
            "중 분류".to_string(),
            "소분류".to_string(),
        ]);
        assert_eq!(resolved, vec!["date", "company", "major", "mid", "minor"]);
        assert!(missing_required(&resolved).is_empty());
    }

    #[test]
    fn alias_resolution_is_idempotent() {
        let canonical: Vec<String> = ["date", "company", "major", "mid", "minor", "channel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(resolve_headers(&canonical), canonical);
        assert_eq!(resolve_headers(&resolve_headers(&canonical)), canonical);
    }

    #[test]
    fn missing_required_columns_reject_the_whole_file() {
        let t = table(&["날짜", "기업명", "대분류"], &[&["2026-01-05", "Acme", "billing"]]);
        let err = normalize_channel(&t, Channel::Phone).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mid") && msg.contains("minor"), "{}", msg);
        assert!(msg.contains("phone"), "{}", msg);
    }

    #[test]
    fn rows_without_a_parseable_date_are_dropped_not_fatal() {
        let t = table(
            &["날짜", "기업명", "대분류", "중분류", "소분류"],
            &[
                &["2026-01-05", "Acme", "billing", "invoice", "duplicate"],
                &["soon", "Borealis", "billing", "invoice", "duplicate"],
                &["", "Coriolis", "billing", "invoice", "duplicate"],
            ],
        );
        let records = normalize_channel(&t, Channel::Chat).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].company.as_deref(), Some("Acme"));
        assert_eq!(records[0].channel, Channel::Chat);
    }

    #[test]
    fn string_fields_are_trimmed_and_sentinels_nulled() {
        let t = table(
            &["date", "company", "major", "mid", "minor"],
            &[&["2026-01-05", "  Acme  ", "nan", "", "None"]],
        );
        let records = normalize_channel(&t, Channel::Board).unwrap();
        assert_eq!(records[0].company.as_deref(), Some("Acme"));
        assert_eq!(records[0].category_major, None);
        assert_eq!(records[0].category_mid, None);
        assert_eq!(records[0].category_minor, None);
    }

    #[test]
    fn time_column_overrides_the_time_of_day() {
        let t = table(
            &["date", "time", "company", "major", "mid", "minor"],
            &[
                &["2026-01-05", "14:30", "Acme", "a", "b", "c"],
                &["2026-01-05", "0.5", "Acme", "a", "b", "c"],
                &["2026-01-05 08:00:00", "bogus", "Acme", "a", "b", "c"],
            ],
        );
        let records = normalize_channel(&t, Channel::Phone).unwrap();
        assert_eq!(records[0].date.time().to_string(), "14:30:00");
        assert_eq!(records[1].date.time().to_string(), "12:00:00");
        // Unparseable time falls back to the date's own time part.
        assert_eq!(records[2].date.time().to_string(), "08:00:00");
    }

    #[test]
    fn master_rows_read_their_channel_column() {
        let t = table(
            &["date", "company", "major", "mid", "minor", "channel"],
            &[
                &["2026-01-05", "Acme", "a", "b", "c", "phone"],
                &["2026-01-06", "Acme", "a", "b", "c", "board"],
                &["2026-01-07", "Acme", "a", "b", "c", "fax"],
            ],
        );
        let records = normalize_master(&t).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].channel, Channel::Phone);
        assert_eq!(records[1].channel, Channel::Board);
    }
}
