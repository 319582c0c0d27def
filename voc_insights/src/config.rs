// ********* Input data structures ***********

use chrono::{NaiveDate, NaiveDateTime};

/// The intake method of an inquiry.
///
/// Every persisted record carries exactly one channel tag.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Channel {
    Phone,
    Chat,
    Board,
}

impl Channel {
    /// All the channels, in display order.
    pub const ALL: [Channel; 3] = [Channel::Phone, Channel::Chat, Channel::Board];

    /// The canonical label, as stored in the master table.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Phone => "phone",
            Channel::Chat => "chat",
            Channel::Board => "board",
        }
    }

    /// Parses a channel label. Accepts the canonical labels and the
    /// labels found in the upstream Korean exports.
    pub fn parse_label(s: &str) -> Option<Channel> {
        match s.trim() {
            "phone" | "유선" => Some(Channel::Phone),
            "chat" | "채팅" => Some(Channel::Chat),
            "board" | "게시판" => Some(Channel::Board),
            _ => None,
        }
    }
}

/// One row of the master table, after normalization.
///
/// The date is always present (rows without a parseable date are dropped
/// upstream). The string fields are trimmed; blank and "nan"/"none"-like
/// sentinels are normalized to `None`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct InquiryRecord {
    pub date: NaiveDateTime,
    pub company: Option<String>,
    pub category_major: Option<String>,
    pub category_mid: Option<String>,
    pub category_minor: Option<String>,
    pub channel: Channel,
}

/// A categorical column of the master table, for rankings.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ValueColumn {
    Company,
    Major,
    Mid,
    Minor,
}

impl ValueColumn {
    pub(crate) fn get<'a>(&self, rec: &'a InquiryRecord) -> Option<&'a str> {
        let v = match self {
            ValueColumn::Company => &rec.company,
            ValueColumn::Major => &rec.category_major,
            ValueColumn::Mid => &rec.category_mid,
            ValueColumn::Minor => &rec.category_minor,
        };
        v.as_deref()
    }
}

/// Company spellings that stand for "unknown" in the source exports.
/// They are excluded from the company rankings.
pub const EXCLUDED_COMPANIES: &[&str] = &[
    "알수없음",
    "알 수 없음",
    "unknown",
    "Unknown",
    "UNKNOWN",
    "-",
    "nan",
    "None",
];

/// Category labels that mean "self-resolved / nothing to report".
/// They are excluded from the category rankings.
pub const EXCLUDED_CATEGORIES: &[&str] = &["안내사항없음_자체해결", "안내사항없음", "자체해결"];

/// The time unit used to bucket the trend chart.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

impl TimeUnit {
    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        }
    }

    pub fn parse_label(s: &str) -> Option<TimeUnit> {
        match s.trim() {
            "day" | "일" => Some(TimeUnit::Day),
            "week" | "주" => Some(TimeUnit::Week),
            "month" | "월" => Some(TimeUnit::Month),
            _ => None,
        }
    }
}

/// The filter selections of one dashboard view, as an explicit value.
///
/// Every field is optional; an unset field imposes no constraint. The
/// channel list follows the sidebar toggles: `None` means all channels,
/// an empty list means none are selected.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct FilterState {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub channels: Option<Vec<Channel>>,
    pub company: Option<String>,
    pub major: Option<String>,
    pub mid: Option<String>,
    pub minor: Option<String>,
}

// ******** Output data structures *********

/// The count of one (bucket, channel) cell of the trend chart.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BucketCount {
    /// Display label, e.g. "2026.01" or "2026W05".
    pub bucket: String,
    /// Lexicographically sortable twin of `bucket`.
    pub sort_key: String,
    pub channel: Channel,
    pub count: u64,
}

/// A single metric compared between the latest and the previous month.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct MetricDelta {
    pub latest: u64,
    pub previous: u64,
}

impl MetricDelta {
    pub fn delta(&self) -> i64 {
        self.latest as i64 - self.previous as i64
    }

    /// Percentage change, undefined when the previous value is zero.
    pub fn pct(&self) -> Option<f64> {
        if self.previous == 0 {
            None
        } else {
            Some(self.delta() as f64 / self.previous as f64 * 100.0)
        }
    }
}

/// Month-over-month comparison between the two most recent distinct
/// months of a filtered set.
#[derive(PartialEq, Debug, Clone)]
pub struct MonthOverMonth {
    /// Display label of the latest month, e.g. "2026.02".
    pub latest_label: String,
    pub previous_label: String,
    pub total: MetricDelta,
    pub by_channel: Vec<(Channel, MetricDelta)>,
    /// Distinct companies seen in each month.
    pub companies: MetricDelta,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ChannelShare {
    pub channel: Channel,
    pub count: u64,
    /// Share of the period total, in percent. Zero on an empty period.
    pub share: f64,
}

/// The headline numbers of one filtered period.
#[derive(PartialEq, Debug, Clone)]
pub struct PeriodSummary {
    pub total: u64,
    /// Distinct companies, counted over non-null values.
    pub companies: u64,
    pub channels: Vec<ChannelShare>,
    /// Most frequent company, after the unknown-company exclusions.
    pub top_company: Option<(String, u64)>,
    /// Most frequent major category, after the self-resolved exclusions.
    pub top_category: Option<(String, u64)>,
}
