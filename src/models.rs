use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SchemaError;

/// API Response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<Value>,
}

/// One day of advertising activity for the filtered campaign group.
/// Produced once per pull, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRow {
    pub day: NaiveDate,
    pub spend: f64,
    pub impressions: u64,
    pub link_clicks: u64,
    pub landing_page_views: u64,
    pub checkouts_initiated: u64,
    pub purchases: u64,
    pub purchase_revenue: f64,
    pub cost_per_purchase: f64,
    /// Purchase ROAS as reported by the ads platform, when the pull carried it.
    #[serde(default)]
    pub reported_roas: Option<f64>,
}

/// Raw row plus the per-day ratio columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetricsRow {
    #[serde(flatten)]
    pub raw: RawEventRow,
    pub ctr: f64,
    pub connect_rate: f64,
    pub page_conversion_rate: f64,
    pub checkout_conversion_rate: f64,
}

/// Anything keyed by a calendar day, so one range filter serves raw and derived rows.
pub trait Dated {
    fn day(&self) -> NaiveDate;
}

impl Dated for RawEventRow {
    fn day(&self) -> NaiveDate {
        self.day
    }
}

impl Dated for DerivedMetricsRow {
    fn day(&self) -> NaiveDate {
        self.raw.day
    }
}

/// Columns of a daily row as they appear in tabular records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Day,
    Spend,
    Impressions,
    LinkClicks,
    LandingPageViews,
    CheckoutsInitiated,
    Purchases,
    PurchaseRevenue,
    CostPerPurchase,
    ReportedRoas,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Day,
        Column::Spend,
        Column::Impressions,
        Column::LinkClicks,
        Column::LandingPageViews,
        Column::CheckoutsInitiated,
        Column::Purchases,
        Column::PurchaseRevenue,
        Column::CostPerPurchase,
        Column::ReportedRoas,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Column::Day => "day",
            Column::Spend => "spend",
            Column::Impressions => "impressions",
            Column::LinkClicks => "link_clicks",
            Column::LandingPageViews => "landing_page_views",
            Column::CheckoutsInitiated => "checkouts_initiated",
            Column::Purchases => "purchases",
            Column::PurchaseRevenue => "purchase_revenue",
            Column::CostPerPurchase => "cost_per_purchase",
            Column::ReportedRoas => "reported_roas",
        }
    }

    /// Human-facing header, as written by the export.
    pub fn label(self) -> &'static str {
        match self {
            Column::Day => "Day",
            Column::Spend => "Amount Spent",
            Column::Impressions => "Impressions",
            Column::LinkClicks => "Link Clicks",
            Column::LandingPageViews => "Landing Page Views",
            Column::CheckoutsInitiated => "Checkouts Initiated",
            Column::Purchases => "Purchases",
            Column::PurchaseRevenue => "Purchase Conversion Value",
            Column::CostPerPurchase => "Cost per Purchase",
            Column::ReportedRoas => "Purchase ROAS",
        }
    }

    fn matches(self, key: &str) -> bool {
        key == self.key() || key == self.label()
    }
}

impl RawEventRow {
    /// Build a row from a dynamically keyed record, accepting either
    /// canonical keys or display labels as column names.
    pub fn from_record(record: &Value) -> Result<Self, SchemaError> {
        let map = record.as_object().ok_or(SchemaError::NotARecord)?;

        let cost_per_purchase = match lookup(map, Column::CostPerPurchase)? {
            Value::Null => 0.0,
            value => parse_amount(value, Column::CostPerPurchase)?,
        };

        // optional: only insight pulls carry the platform's own ROAS
        let reported_roas = match map
            .get(Column::ReportedRoas.key())
            .or_else(|| map.get(Column::ReportedRoas.label()))
        {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_amount(value, Column::ReportedRoas)?),
        };

        Ok(Self {
            day: parse_day(lookup(map, Column::Day)?, Column::Day)?,
            spend: parse_amount(lookup(map, Column::Spend)?, Column::Spend)?,
            impressions: parse_count(lookup(map, Column::Impressions)?, Column::Impressions)?,
            link_clicks: parse_count(lookup(map, Column::LinkClicks)?, Column::LinkClicks)?,
            landing_page_views: parse_count(
                lookup(map, Column::LandingPageViews)?,
                Column::LandingPageViews,
            )?,
            checkouts_initiated: parse_count(
                lookup(map, Column::CheckoutsInitiated)?,
                Column::CheckoutsInitiated,
            )?,
            purchases: parse_count(lookup(map, Column::Purchases)?, Column::Purchases)?,
            purchase_revenue: parse_amount(
                lookup(map, Column::PurchaseRevenue)?,
                Column::PurchaseRevenue,
            )?,
            cost_per_purchase,
            reported_roas,
        })
    }
}

fn lookup<'a>(record: &'a Map<String, Value>, column: Column) -> Result<&'a Value, SchemaError> {
    record
        .get(column.key())
        .or_else(|| record.get(column.label()))
        .ok_or_else(|| SchemaError::MissingColumn {
            column: column.key(),
            closest: closest_key(record, &[column.key(), column.label()], |candidate| {
                Column::ALL.iter().any(|c| c.matches(candidate))
            }),
        })
}

/// Closest unrecognised key in the record, if any is similar enough to be a typo
/// of one of `names`.
pub(crate) fn closest_key(
    record: &Map<String, Value>,
    names: &[&str],
    known: impl Fn(&str) -> bool,
) -> Option<String> {
    let names: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();

    record
        .keys()
        .filter(|candidate| !known(candidate.as_str()))
        .map(|candidate| {
            let lowered = candidate.to_lowercase();
            let score = names
                .iter()
                .map(|name| strsim::jaro_winkler(&lowered, name))
                .fold(0.0, f64::max);
            (candidate, score)
        })
        .filter(|(_, score)| *score >= 0.85)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.clone())
}

/// Numeric value of a JSON number or a numeric string.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn malformed(value: &Value, column: Column) -> SchemaError {
    SchemaError::Malformed {
        column: column.key(),
        value: value.to_string(),
    }
}

pub(crate) fn parse_amount(value: &Value, column: Column) -> Result<f64, SchemaError> {
    as_number(value)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| malformed(value, column))
}

/// Largest count the store can hold (SQLite integers are signed 64-bit).
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// Floats above this may already have lost integer precision.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

pub(crate) fn parse_count(value: &Value, column: Column) -> Result<u64, SchemaError> {
    let count = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_float))
        }
        _ => None,
    };

    count
        .filter(|n| *n <= MAX_COUNT)
        .ok_or_else(|| malformed(value, column))
}

/// Whole, non-negative floats small enough to convert exactly, e.g. `40.0` from a spreadsheet.
fn whole_float(n: f64) -> Option<u64> {
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= MAX_EXACT_FLOAT).then(|| n as u64)
}

/// Dates may carry a time component; only the calendar day is kept.
pub(crate) fn parse_day(value: &Value, column: Column) -> Result<NaiveDate, SchemaError> {
    let text = value.as_str().map(str::trim).ok_or_else(|| malformed(value, column))?;

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.date_naive()))
        .map_err(|_| malformed(value, column))
}

/// Funnel stages, widest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelStage {
    Impressions,
    #[serde(rename = "Link Clicks")]
    LinkClicks,
    #[serde(rename = "Landing Page Views")]
    LandingPageViews,
    #[serde(rename = "Checkouts Initiated")]
    CheckoutsInitiated,
    Purchases,
}

impl FunnelStage {
    pub const ORDER: [FunnelStage; 5] = [
        FunnelStage::Impressions,
        FunnelStage::LinkClicks,
        FunnelStage::LandingPageViews,
        FunnelStage::CheckoutsInitiated,
        FunnelStage::Purchases,
    ];

    pub fn count(self, row: &RawEventRow) -> u64 {
        match self {
            FunnelStage::Impressions => row.impressions,
            FunnelStage::LinkClicks => row.link_clicks,
            FunnelStage::LandingPageViews => row.landing_page_views,
            FunnelStage::CheckoutsInitiated => row.checkouts_initiated,
            FunnelStage::Purchases => row.purchases,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStageTotal {
    pub stage: FunnelStage,
    pub total: u64,
}

/// Exactly five stage totals in [`FunnelStage::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunnelSummary {
    pub stages: [FunnelStageTotal; 5],
}

impl FunnelSummary {
    pub fn zero() -> Self {
        Self {
            stages: FunnelStage::ORDER.map(|stage| FunnelStageTotal { stage, total: 0 }),
        }
    }

    pub fn total(&self, stage: FunnelStage) -> u64 {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.total)
            .unwrap_or(0)
    }
}

/// Closed interval of days. Reversed bounds are swapped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeSelection {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRangeSelection {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start > end {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn clamp_to(self, min: NaiveDate, max: NaiveDate) -> Self {
        Self::new(self.start.clamp(min, max), self.end.clamp(min, max))
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Totals behind the KPI cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_spend: f64,
    pub total_purchases: u64,
    pub cac: f64,
    pub total_revenue: f64,
    pub roas: f64,
}

/// One replacement of the stored dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullInfo {
    pub id: Uuid,
    pub pulled_at: DateTime<Utc>,
    pub row_count: usize,
}
