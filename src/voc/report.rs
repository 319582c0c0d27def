// Report generation: one JSON document summarizing a filtered view of
// the master table.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use serde_json::json;
use serde_json::Value as JSValue;
use snafu::prelude::*;
use text_diff::print_diff;

use voc_insights::{
    bucket_counts, filter, month_over_month, period_summary, previous_period, top_n, Channel,
    FilterState, MetricDelta, MonthOverMonth, PeriodSummary, TimeUnit, ValueColumn,
    EXCLUDED_CATEGORIES, EXCLUDED_COMPANIES,
};

use crate::args::ReportArgs;
use crate::voc::store::MasterStore;
use crate::voc::{IoSnafu, ParsingMetaSnafu, VocResult};

/// Builds the filter state from the command line: an optional saved query
/// string first, then the explicit flags on top of it.
fn build_filters(rargs: &ReportArgs) -> VocResult<FilterState> {
    let mut state = match &rargs.query {
        Some(q) => FilterState::from_query(q),
        None => FilterState::default(),
    };
    if let Some(s) = &rargs.start {
        state.start = Some(parse_date_flag(s)?);
    }
    if let Some(s) = &rargs.end {
        state.end = Some(parse_date_flag(s)?);
    }
    if let Some(list) = &rargs.channels {
        let mut channels: Vec<Channel> = Vec::new();
        for label in list.split(',').filter(|s| !s.trim().is_empty()) {
            match Channel::parse_label(label) {
                Some(ch) => channels.push(ch),
                None => whatever!("unknown channel {:?}", label),
            }
        }
        state.channels = Some(channels);
    }
    if rargs.company.is_some() {
        state.company = rargs.company.clone();
    }
    if rargs.major.is_some() {
        state.major = rargs.major.clone();
    }
    if rargs.mid.is_some() {
        state.mid = rargs.mid.clone();
    }
    if rargs.minor.is_some() {
        state.minor = rargs.minor.clone();
    }
    Ok(state)
}

fn parse_date_flag(s: &str) -> VocResult<NaiveDate> {
    match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        Ok(d) => Ok(d),
        Err(_) => whatever!("unrecognized date {:?} (expected YYYY-MM-DD)", s),
    }
}

fn ranking_js(counts: &[(String, u64)]) -> Vec<JSValue> {
    counts
        .iter()
        .map(|(name, count)| json!({"name": name, "count": count}))
        .collect()
}

fn delta_js(d: &MetricDelta) -> JSValue {
    json!({
        "latest": d.latest,
        "previous": d.previous,
        "delta": d.delta(),
        "pct": d.pct(),
    })
}

fn mom_js(m: &MonthOverMonth) -> JSValue {
    let by_channel: Vec<JSValue> = m
        .by_channel
        .iter()
        .map(|(ch, d)| {
            let mut js = delta_js(d);
            js["channel"] = json!(ch.label());
            js
        })
        .collect();
    json!({
        "latestMonth": m.latest_label,
        "previousMonth": m.previous_label,
        "total": delta_js(&m.total),
        "companies": delta_js(&m.companies),
        "byChannel": by_channel,
    })
}

fn summary_js(s: &PeriodSummary) -> JSValue {
    let channels: Vec<JSValue> = s
        .channels
        .iter()
        .map(|c| {
            json!({
                "channel": c.channel.label(),
                "count": c.count,
                "share": c.share,
            })
        })
        .collect();
    json!({
        "total": s.total,
        "companies": s.companies,
        "channels": channels,
        "topCompany": s.top_company.as_ref().map(|(name, count)| json!({"name": name, "count": count})),
        "topCategory": s.top_category.as_ref().map(|(name, count)| json!({"name": name, "count": count})),
    })
}

/// Assembles the full report document for a filtered view.
pub fn build_report_js(
    records: &[voc_insights::InquiryRecord],
    filters: &FilterState,
    unit: TimeUnit,
    top: usize,
) -> JSValue {
    let selected = filter(records, filters);
    let trend: Vec<JSValue> = bucket_counts(&selected, unit)
        .iter()
        .map(|b| json!({"bucket": b.bucket, "channel": b.channel.label(), "count": b.count}))
        .collect();
    let rankings = json!({
        "companies": ranking_js(&top_n(&selected, ValueColumn::Company, top, EXCLUDED_COMPANIES)),
        "major": ranking_js(&top_n(&selected, ValueColumn::Major, top, EXCLUDED_CATEGORIES)),
        "mid": ranking_js(&top_n(&selected, ValueColumn::Mid, top, EXCLUDED_CATEGORIES)),
        "minor": ranking_js(&top_n(&selected, ValueColumn::Minor, top, EXCLUDED_CATEGORIES)),
    });
    let mom = match month_over_month(&selected) {
        Some(m) => mom_js(&m),
        None => JSValue::Null,
    };

    // The preceding period of identical length, under the same filters,
    // when an explicit date range was requested.
    let previous = match (filters.start, filters.end) {
        (Some(start), Some(end)) => {
            let (prev_start, prev_end) = previous_period(start, end);
            let prev_filters = FilterState {
                start: Some(prev_start),
                end: Some(prev_end),
                ..filters.clone()
            };
            let prev_selected = filter(records, &prev_filters);
            let mut js = summary_js(&period_summary(&prev_selected));
            js["start"] = json!(prev_start.format("%Y-%m-%d").to_string());
            js["end"] = json!(prev_end.format("%Y-%m-%d").to_string());
            js
        }
        _ => JSValue::Null,
    };

    json!({
        "filters": filters.to_query(),
        "unit": unit.label(),
        "summary": summary_js(&period_summary(&selected)),
        "trend": trend,
        "top": rankings,
        "monthOverMonth": mom,
        "previousPeriod": previous,
    })
}

pub fn run_report(data_dir: &Path, rargs: &ReportArgs) -> VocResult<()> {
    let store = MasterStore::new(data_dir);
    let records = match store.load_table()? {
        Some(r) => r,
        None => whatever!("no master table found; run ingest first"),
    };
    let filters = build_filters(rargs)?;
    let unit = match TimeUnit::parse_label(&rargs.unit) {
        Some(u) => u,
        None => whatever!("unknown time unit {:?}", rargs.unit),
    };
    info!(
        "report: {} rows, filters {:?}, unit {}",
        records.len(),
        filters,
        unit.label()
    );

    let report = build_report_js(&records, &filters, unit, rargs.top);
    let pretty = serde_json::to_string_pretty(&report).context(ParsingMetaSnafu {})?;
    match rargs.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty),
        Some(path) => {
            fs::write(path, &pretty).context(IoSnafu {
                path: path.to_string(),
            })?;
            info!("report: written to {}", path);
        }
    }

    // The reference report, if provided for comparison
    if let Some(reference) = &rargs.reference {
        let contents = fs::read_to_string(reference).context(IoSnafu {
            path: reference.clone(),
        })?;
        let reference_js: JSValue =
            serde_json::from_str(&contents).context(ParsingMetaSnafu {})?;
        let pretty_ref =
            serde_json::to_string_pretty(&reference_js).context(ParsingMetaSnafu {})?;
        if pretty_ref != pretty {
            warn!("Found differences with the reference report");
            print_diff(pretty_ref.as_str(), pretty.as_ref(), "\n");
            whatever!("difference detected between report and reference")
        }
    }
    Ok(())
}
