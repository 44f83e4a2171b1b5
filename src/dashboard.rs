use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::format::{brl, compact, ratio_2dp};
use crate::metrics::{bounds, filter_range, MetricsDeriver};
use crate::models::{
    Column, DateRangeSelection, DerivedMetricsRow, FunnelSummary, PullInfo, RawEventRow, SummaryMetrics,
};

/// A KPI card: the raw number and how it is shown.
#[derive(Debug, Clone, Serialize)]
pub struct MetricCard {
    pub label: &'static str,
    pub value: f64,
    pub display: String,
}

/// One point of the daily spend / purchases / CAC chart, with point labels.
#[derive(Debug, Clone, Serialize)]
pub struct KpiPoint {
    pub day: NaiveDate,
    pub purchases: u64,
    pub cost_per_purchase: f64,
    pub spend: f64,
    pub purchases_label: String,
    pub cost_per_purchase_label: String,
    pub spend_label: String,
}

impl KpiPoint {
    fn from_row(row: &RawEventRow) -> Self {
        Self {
            day: row.day,
            purchases: row.purchases,
            cost_per_purchase: row.cost_per_purchase,
            spend: row.spend,
            purchases_label: compact(row.purchases as f64, false),
            cost_per_purchase_label: compact(row.cost_per_purchase, true),
            spend_label: compact(row.spend, true),
        }
    }
}

/// Everything the dashboard renders for one date range selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    /// First and last day available for selection.
    pub bounds: Option<DateRangeSelection>,
    /// The selection actually applied, after defaults and clamping.
    pub range: Option<DateRangeSelection>,
    pub last_updated: Option<DateTime<Utc>>,
    pub summary: SummaryMetrics,
    pub cards: Vec<MetricCard>,
    pub funnel: FunnelSummary,
    pub kpi_series: Vec<KpiPoint>,
    pub rates: Vec<DerivedMetricsRow>,
}

/// Turns a requested selection into one inside the dataset. Missing bounds
/// default to the first/last day; `None` when there are no rows at all.
pub fn resolve_range(
    rows: &[RawEventRow],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Option<DateRangeSelection> {
    let (min, max) = bounds(rows)?;
    Some(DateRangeSelection::new(start.unwrap_or(min), end.unwrap_or(max)).clamp_to(min, max))
}

impl DashboardView {
    pub fn build(
        rows: &[RawEventRow],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        last_pull: Option<&PullInfo>,
    ) -> Self {
        let deriver = MetricsDeriver::new(rows);
        // ratios come from the full set, the range only selects what is shown
        let derived = deriver.derive();
        let range = resolve_range(rows, start, end);

        let (summary, funnel, rates) = match &range {
            Some(range) => (
                deriver.summary_metrics(range),
                deriver.aggregate(range),
                filter_range(&derived, range).into_iter().cloned().collect::<Vec<_>>(),
            ),
            None => (SummaryMetrics::default(), FunnelSummary::zero(), Vec::new()),
        };

        Self {
            bounds: deriver.bounds().map(|(min, max)| DateRangeSelection::new(min, max)),
            range,
            last_updated: last_pull.map(|pull| pull.pulled_at),
            cards: cards(&summary),
            summary,
            funnel,
            kpi_series: rates.iter().map(|r| KpiPoint::from_row(&r.raw)).collect(),
            rates,
        }
    }
}

fn cards(summary: &SummaryMetrics) -> Vec<MetricCard> {
    vec![
        MetricCard {
            label: Column::Spend.label(),
            value: summary.total_spend,
            display: brl(summary.total_spend),
        },
        MetricCard {
            label: Column::Purchases.label(),
            value: summary.total_purchases as f64,
            display: summary.total_purchases.to_string(),
        },
        MetricCard {
            label: "CAC",
            value: summary.cac,
            display: brl(summary.cac),
        },
        MetricCard {
            label: Column::PurchaseRevenue.label(),
            value: summary.total_revenue,
            display: brl(summary.total_revenue),
        },
        MetricCard {
            label: "ROAS",
            value: summary.roas,
            display: ratio_2dp(summary.roas),
        },
    ]
}
