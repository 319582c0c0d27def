mod config;
use log::debug;

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

pub use crate::config::*;

/// Applies a filter state to a set of records.
///
/// The predicate is a conjunction: inclusive date range, channel
/// membership, exact company and exact category at each level. Fields
/// left unset impose no constraint, so the empty state is the identity.
/// A value that matches nothing simply yields an empty result.
pub fn filter(records: &[InquiryRecord], state: &FilterState) -> Vec<InquiryRecord> {
    let res: Vec<InquiryRecord> = records
        .iter()
        .filter(|r| {
            if let Some(start) = state.start {
                if r.date.date() < start {
                    return false;
                }
            }
            if let Some(end) = state.end {
                if r.date.date() > end {
                    return false;
                }
            }
            if let Some(channels) = &state.channels {
                if !channels.contains(&r.channel) {
                    return false;
                }
            }
            if let Some(company) = &state.company {
                if r.company.as_deref() != Some(company.as_str()) {
                    return false;
                }
            }
            if let Some(major) = &state.major {
                if r.category_major.as_deref() != Some(major.as_str()) {
                    return false;
                }
            }
            if let Some(mid) = &state.mid {
                if r.category_mid.as_deref() != Some(mid.as_str()) {
                    return false;
                }
            }
            if let Some(minor) = &state.minor {
                if r.category_minor.as_deref() != Some(minor.as_str()) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();
    debug!("filter: {} -> {} records", records.len(), res.len());
    res
}

/// The (display, sort) bucket keys of a timestamp for the given unit.
///
/// The sort key orders chronologically under plain string comparison,
/// whatever the display format looks like.
pub fn bucket_keys(date: &NaiveDateTime, unit: TimeUnit) -> (String, String) {
    match unit {
        TimeUnit::Day => (
            date.format("%Y.%m.%d").to_string(),
            date.format("%Y%m%d").to_string(),
        ),
        TimeUnit::Week => {
            let iso = date.iso_week();
            (
                format!("{}W{:02}", iso.year(), iso.week()),
                format!("{}{:02}", iso.year(), iso.week()),
            )
        }
        TimeUnit::Month => (
            date.format("%Y.%m").to_string(),
            date.format("%Y%m").to_string(),
        ),
    }
}

/// Counts records per (bucket, channel), sorted chronologically and by
/// channel within a bucket.
pub fn bucket_counts(records: &[InquiryRecord], unit: TimeUnit) -> Vec<BucketCount> {
    let mut counts: HashMap<(String, String, Channel), u64> = HashMap::new();
    for r in records.iter() {
        let (bucket, sort_key) = bucket_keys(&r.date, unit);
        *counts.entry((bucket, sort_key, r.channel)).or_insert(0) += 1;
    }
    let mut res: Vec<BucketCount> = counts
        .into_iter()
        .map(|((bucket, sort_key, channel), count)| BucketCount {
            bucket,
            sort_key,
            channel,
            count,
        })
        .collect();
    res.sort_by(|a, b| (&a.sort_key, a.channel).cmp(&(&b.sort_key, b.channel)));
    res
}

/// Frequency counts of one categorical column, in first-appearance order.
///
/// Null, blank and "nan"/"none"-like values are skipped before counting.
pub fn value_counts(records: &[InquiryRecord], column: ValueColumn) -> Vec<(String, u64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for r in records.iter() {
        let v = match column.get(r) {
            Some(s) => s.trim(),
            None => continue,
        };
        if v.is_empty() {
            continue;
        }
        let lower = v.to_lowercase();
        if lower == "nan" || lower == "none" {
            continue;
        }
        let e = counts.entry(v.to_string()).or_insert(0);
        if *e == 0 {
            order.push(v.to_string());
        }
        *e += 1;
    }
    order
        .into_iter()
        .map(|name| {
            let c = counts[&name];
            (name, c)
        })
        .collect()
}

/// The top `n` values of a column by descending count.
///
/// Values in `excludes` are dropped before ranking. Ties keep the order
/// produced by the counting step (first appearance in the input).
pub fn top_n(
    records: &[InquiryRecord],
    column: ValueColumn,
    n: usize,
    excludes: &[&str],
) -> Vec<(String, u64)> {
    let mut counts = value_counts(records, column);
    counts.retain(|(name, _)| !excludes.contains(&name.as_str()));
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

/// Distinct non-null companies in a set of records.
pub fn distinct_companies(records: &[InquiryRecord]) -> u64 {
    let set: HashSet<&str> = records.iter().filter_map(|r| r.company.as_deref()).collect();
    set.len() as u64
}

fn month_sort_key(date: &NaiveDateTime) -> String {
    date.format("%Y%m").to_string()
}

fn month_label(date: &NaiveDateTime) -> String {
    date.format("%Y.%m").to_string()
}

/// Compares the latest month of a filtered set against the previous
/// distinct month present in that same set.
///
/// "Previous" follows the distinct-month sort order, not calendar
/// adjacency: if the data skips a month, the next-most-recent month
/// present is used. Returns `None` when fewer than two distinct months
/// exist; the comparison is then not applicable rather than zero.
pub fn month_over_month(records: &[InquiryRecord]) -> Option<MonthOverMonth> {
    let mut months: Vec<String> = records
        .iter()
        .map(|r| month_sort_key(&r.date))
        .collect::<HashSet<String>>()
        .into_iter()
        .collect();
    months.sort();
    if months.len() < 2 {
        debug!("month_over_month: {} distinct months, not applicable", months.len());
        return None;
    }
    let latest_key = &months[months.len() - 1];
    let previous_key = &months[months.len() - 2];

    let latest: Vec<&InquiryRecord> = records
        .iter()
        .filter(|r| month_sort_key(&r.date) == *latest_key)
        .collect();
    let previous: Vec<&InquiryRecord> = records
        .iter()
        .filter(|r| month_sort_key(&r.date) == *previous_key)
        .collect();

    let channel_count = |rows: &[&InquiryRecord], ch: Channel| -> u64 {
        rows.iter().filter(|r| r.channel == ch).count() as u64
    };
    let company_count = |rows: &[&InquiryRecord]| -> u64 {
        let set: HashSet<&str> = rows.iter().filter_map(|r| r.company.as_deref()).collect();
        set.len() as u64
    };

    let by_channel = Channel::ALL
        .iter()
        .map(|&ch| {
            (
                ch,
                MetricDelta {
                    latest: channel_count(&latest, ch),
                    previous: channel_count(&previous, ch),
                },
            )
        })
        .collect();

    Some(MonthOverMonth {
        latest_label: month_label(&latest[0].date),
        previous_label: month_label(&previous[0].date),
        total: MetricDelta {
            latest: latest.len() as u64,
            previous: previous.len() as u64,
        },
        by_channel,
        companies: MetricDelta {
            latest: company_count(&latest),
            previous: company_count(&previous),
        },
    })
}

/// The period immediately preceding `[start, end]`, with the same length.
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days = (end - start).num_days() + 1;
    let prev_end = start - Duration::days(1);
    let prev_start = prev_end - Duration::days(days - 1);
    (prev_start, prev_end)
}

/// The headline numbers of a filtered period: totals, channel shares,
/// distinct companies and the top company/category after the sentinel
/// exclusions.
pub fn period_summary(records: &[InquiryRecord]) -> PeriodSummary {
    let total = records.len() as u64;
    let channels = Channel::ALL
        .iter()
        .map(|&ch| {
            let count = records.iter().filter(|r| r.channel == ch).count() as u64;
            let share = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            };
            ChannelShare { channel: ch, count, share }
        })
        .collect();
    let top_company = top_n(records, ValueColumn::Company, 1, EXCLUDED_COMPANIES)
        .into_iter()
        .next();
    let top_category = top_n(records, ValueColumn::Major, 1, EXCLUDED_CATEGORIES)
        .into_iter()
        .next();
    PeriodSummary {
        total,
        companies: distinct_companies(records),
        channels,
        top_company,
        top_category,
    }
}

impl FilterState {
    /// Serializes the state as a URL-style query string, for shareable
    /// links. Unset fields are omitted.
    pub fn to_query(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(d) = self.start {
            parts.push(format!("start={}", d.format("%Y-%m-%d")));
        }
        if let Some(d) = self.end {
            parts.push(format!("end={}", d.format("%Y-%m-%d")));
        }
        if let Some(channels) = &self.channels {
            let labels: Vec<&str> = channels.iter().map(|c| c.label()).collect();
            parts.push(format!("ch={}", labels.join(",")));
        }
        if let Some(v) = &self.company {
            parts.push(format!("company={}", v));
        }
        if let Some(v) = &self.major {
            parts.push(format!("major={}", v));
        }
        if let Some(v) = &self.mid {
            parts.push(format!("mid={}", v));
        }
        if let Some(v) = &self.minor {
            parts.push(format!("minor={}", v));
        }
        parts.join("&")
    }

    /// Parses a query string produced by [`FilterState::to_query`].
    ///
    /// Lenient: unknown keys and unparseable dates are skipped, unknown
    /// channel labels are dropped from the list.
    pub fn from_query(query: &str) -> FilterState {
        let mut state = FilterState::default();
        for part in query.split('&') {
            let (key, value) = match part.split_once('=') {
                Some(p) => p,
                None => continue,
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "start" => state.start = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
                "end" => state.end = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
                "ch" => {
                    state.channels =
                        Some(value.split(',').filter_map(Channel::parse_label).collect())
                }
                "company" => state.company = Some(value.to_string()),
                "major" => state.major = Some(value.to_string()),
                "mid" => state.mid = Some(value.to_string()),
                "minor" => state.minor = Some(value.to_string()),
                _ => {
                    debug!("from_query: skipping unknown key {:?}", key);
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(date: &str, company: &str, major: &str, channel: Channel) -> InquiryRecord {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let opt = |s: &str| {
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        InquiryRecord {
            date,
            company: opt(company),
            category_major: opt(major),
            category_mid: None,
            category_minor: None,
            channel,
        }
    }

    fn sample() -> Vec<InquiryRecord> {
        vec![
            rec("2026-01-05", "Acme", "billing", Channel::Phone),
            rec("2026-01-20", "Borealis", "billing", Channel::Chat),
            rec("2026-02-02", "Acme", "login", Channel::Board),
        ]
    }

    #[test]
    fn filter_with_empty_state_is_identity() {
        let data = sample();
        assert_eq!(filter(&data, &FilterState::default()), data);
    }

    #[test]
    fn filter_composes_as_conjunction() {
        let data = sample();
        let narrow = FilterState {
            start: Some(d("2026-01-01")),
            end: Some(d("2026-01-31")),
            company: Some("Acme".to_string()),
            ..FilterState::default()
        };
        let date_only = FilterState {
            start: Some(d("2026-01-01")),
            end: Some(d("2026-01-31")),
            ..FilterState::default()
        };
        let company_only = FilterState {
            company: Some("Acme".to_string()),
            ..FilterState::default()
        };
        let chained = filter(&filter(&data, &date_only), &company_only);
        assert_eq!(filter(&data, &narrow), chained);
        assert_eq!(chained.len(), 1);
    }

    #[test]
    fn filter_unmatched_company_is_empty_not_an_error() {
        let data = sample();
        let state = FilterState {
            company: Some("NoSuchCo".to_string()),
            ..FilterState::default()
        };
        assert!(filter(&data, &state).is_empty());
    }

    #[test]
    fn filter_empty_channel_list_selects_nothing() {
        let data = sample();
        let state = FilterState {
            channels: Some(vec![]),
            ..FilterState::default()
        };
        assert!(filter(&data, &state).is_empty());
    }

    #[test]
    fn filter_date_range_is_inclusive() {
        let data = sample();
        let state = FilterState {
            start: Some(d("2026-01-05")),
            end: Some(d("2026-01-20")),
            ..FilterState::default()
        };
        assert_eq!(filter(&data, &state).len(), 2);
    }

    #[test]
    fn monthly_buckets_sort_chronologically_regardless_of_input_order() {
        let mut data = sample();
        data.reverse();
        let buckets = bucket_counts(&data, TimeUnit::Month);
        let totals: Vec<(String, u64)> = {
            // Collapse channels to check the per-month totals.
            let mut acc: Vec<(String, u64)> = Vec::new();
            for b in buckets.iter() {
                match acc.last_mut() {
                    Some((label, c)) if *label == b.bucket => *c += b.count,
                    _ => acc.push((b.bucket.clone(), b.count)),
                }
            }
            acc
        };
        assert_eq!(
            totals,
            vec![("2026.01".to_string(), 2), ("2026.02".to_string(), 1)]
        );
    }

    #[test]
    fn week_bucket_keys_are_zero_padded_iso_weeks() {
        let date = d("2026-01-05").and_hms_opt(0, 0, 0).unwrap();
        let (bucket, sort_key) = bucket_keys(&date, TimeUnit::Week);
        assert_eq!(bucket, "2026W02");
        assert_eq!(sort_key, "202602");
    }

    #[test]
    fn day_bucket_keys_use_dotted_display_format() {
        let date = d("2026-01-05").and_hms_opt(23, 59, 0).unwrap();
        let (bucket, sort_key) = bucket_keys(&date, TimeUnit::Day);
        assert_eq!(bucket, "2026.01.05");
        assert_eq!(sort_key, "20260105");
    }

    #[test]
    fn top_n_never_returns_excluded_values() {
        let mut data: Vec<InquiryRecord> = Vec::new();
        for _ in 0..50 {
            data.push(rec("2026-01-05", "unknown", "", Channel::Phone));
        }
        for _ in 0..10 {
            data.push(rec("2026-01-05", "Acme", "", Channel::Phone));
        }
        for _ in 0..8 {
            data.push(rec("2026-01-05", "Borealis", "", Channel::Phone));
        }
        let top = top_n(&data, ValueColumn::Company, 1, EXCLUDED_COMPANIES);
        assert_eq!(top, vec![("Acme".to_string(), 10)]);
    }

    #[test]
    fn top_n_breaks_ties_by_first_appearance() {
        let data = vec![
            rec("2026-01-05", "Borealis", "", Channel::Phone),
            rec("2026-01-06", "Acme", "", Channel::Phone),
            rec("2026-01-07", "Borealis", "", Channel::Phone),
            rec("2026-01-08", "Acme", "", Channel::Phone),
        ];
        let top = top_n(&data, ValueColumn::Company, 2, &[]);
        assert_eq!(
            top,
            vec![("Borealis".to_string(), 2), ("Acme".to_string(), 2)]
        );
    }

    #[test]
    fn value_counts_skips_blank_and_nan_like_values() {
        let mut data = sample();
        data.push(rec("2026-01-09", "  ", "", Channel::Phone));
        data.push(rec("2026-01-09", "nan", "", Channel::Phone));
        data.push(rec("2026-01-09", "None", "", Channel::Phone));
        let counts = value_counts(&data, ValueColumn::Company);
        assert_eq!(
            counts,
            vec![("Acme".to_string(), 2), ("Borealis".to_string(), 1)]
        );
    }

    #[test]
    fn month_over_month_on_a_single_month_is_not_applicable() {
        let data = vec![
            rec("2026-03-01", "Acme", "", Channel::Phone),
            rec("2026-03-20", "Borealis", "", Channel::Chat),
        ];
        assert_eq!(month_over_month(&data), None);
    }

    #[test]
    fn month_over_month_uses_distinct_months_not_calendar_adjacency() {
        // January and March only: "previous" is January.
        let data = vec![
            rec("2026-01-05", "Acme", "", Channel::Phone),
            rec("2026-01-06", "Acme", "", Channel::Phone),
            rec("2026-01-07", "Borealis", "", Channel::Chat),
            rec("2026-03-02", "Acme", "", Channel::Phone),
        ];
        let mom = month_over_month(&data).unwrap();
        assert_eq!(mom.latest_label, "2026.03");
        assert_eq!(mom.previous_label, "2026.01");
        assert_eq!(mom.total, MetricDelta { latest: 1, previous: 3 });
        assert_eq!(mom.companies, MetricDelta { latest: 1, previous: 2 });
    }

    #[test]
    fn metric_delta_pct_is_undefined_on_zero_previous() {
        let m = MetricDelta { latest: 5, previous: 0 };
        assert_eq!(m.delta(), 5);
        assert_eq!(m.pct(), None);
        let m2 = MetricDelta { latest: 6, previous: 4 };
        assert_eq!(m2.delta(), 2);
        assert_eq!(m2.pct(), Some(50.0));
    }

    #[test]
    fn previous_period_has_identical_length() {
        let (prev_start, prev_end) = previous_period(d("2026-02-10"), d("2026-02-19"));
        assert_eq!(prev_end, d("2026-02-09"));
        assert_eq!(prev_start, d("2026-01-31"));
        assert_eq!((prev_end - prev_start).num_days(), 9);
    }

    #[test]
    fn period_summary_shares_add_up() {
        let data = sample();
        let summary = period_summary(&data);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.companies, 2);
        let total_share: f64 = summary.channels.iter().map(|c| c.share).sum();
        assert!((total_share - 100.0).abs() < 1e-9);
        assert_eq!(summary.top_company, Some(("Acme".to_string(), 2)));
        assert_eq!(summary.top_category, Some(("billing".to_string(), 2)));
    }

    #[test]
    fn query_state_round_trips() {
        let state = FilterState {
            start: Some(d("2026-01-01")),
            end: Some(d("2026-03-31")),
            channels: Some(vec![Channel::Phone, Channel::Board]),
            company: Some("Acme".to_string()),
            major: Some("billing".to_string()),
            mid: None,
            minor: None,
        };
        let q = state.to_query();
        assert_eq!(FilterState::from_query(&q), state);
    }

    #[test]
    fn from_query_skips_junk() {
        let state = FilterState::from_query("start=not-a-date&bogus=1&ch=phone,carrierpigeon");
        assert_eq!(state.start, None);
        assert_eq!(state.channels, Some(vec![Channel::Phone]));
    }
}
