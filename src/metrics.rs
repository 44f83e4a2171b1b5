use chrono::NaiveDate;

use crate::models::{
    Dated, DateRangeSelection, DerivedMetricsRow, FunnelStage, FunnelStageTotal, FunnelSummary,
    RawEventRow, SummaryMetrics,
};

/// Derives ratio columns, funnel totals and KPI totals from the daily rows of a pull.
///
/// Ratios are computed per row over the full set; ranges only narrow what
/// is summed or displayed.
pub struct MetricsDeriver<'a> {
    rows: &'a [RawEventRow],
}

impl<'a> MetricsDeriver<'a> {
    pub fn new(rows: &'a [RawEventRow]) -> Self {
        Self { rows }
    }

    /// Appends the four ratio columns to every row, in input order.
    pub fn derive(&self) -> Vec<DerivedMetricsRow> {
        self.rows
            .iter()
            .map(|row| DerivedMetricsRow {
                raw: row.clone(),
                ctr: ratio(row.link_clicks, row.impressions),
                connect_rate: ratio(row.landing_page_views, row.link_clicks),
                page_conversion_rate: ratio(row.checkouts_initiated, row.landing_page_views),
                checkout_conversion_rate: ratio(row.purchases, row.checkouts_initiated),
            })
            .collect()
    }

    /// Sums each funnel stage over the rows inside `range`. Totals saturate at `u64::MAX`.
    pub fn aggregate(&self, range: &DateRangeSelection) -> FunnelSummary {
        let in_range = filter_range(self.rows, range);

        FunnelSummary {
            stages: FunnelStage::ORDER.map(|stage| FunnelStageTotal {
                stage,
                total: saturating_sum(in_range.iter().map(|row| stage.count(row))),
            }),
        }
    }

    /// KPI totals over the rows inside `range`. Zero denominators give 0 here,
    /// unlike the per-row ratios.
    pub fn summary_metrics(&self, range: &DateRangeSelection) -> SummaryMetrics {
        let in_range = filter_range(self.rows, range);

        let total_spend: f64 = in_range.iter().map(|row| row.spend).sum();
        let total_purchases = saturating_sum(in_range.iter().map(|row| row.purchases));
        let total_revenue: f64 = in_range.iter().map(|row| row.purchase_revenue).sum();

        SummaryMetrics {
            total_spend,
            total_purchases,
            cac: if total_purchases > 0 {
                total_spend / total_purchases as f64
            } else {
                0.0
            },
            total_revenue,
            roas: if total_spend > 0.0 {
                total_revenue / total_spend
            } else {
                0.0
            },
        }
    }

    /// First and last day present, if there are any rows.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        bounds(self.rows)
    }
}

/// `numerator / denominator`, with a zero denominator giving positive infinity.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        f64::INFINITY
    } else {
        numerator as f64 / denominator as f64
    }
}

fn saturating_sum(counts: impl Iterator<Item = u64>) -> u64 {
    counts.fold(0, u64::saturating_add)
}

/// Rows whose day falls inside `range`, both ends inclusive, in input order.
pub fn filter_range<'r, T: Dated>(items: &'r [T], range: &DateRangeSelection) -> Vec<&'r T> {
    items.iter().filter(|item| range.contains(item.day())).collect()
}

pub fn bounds<T: Dated>(items: &[T]) -> Option<(NaiveDate, NaiveDate)> {
    let min = items.iter().map(Dated::day).min()?;
    let max = items.iter().map(Dated::day).max()?;
    Some((min, max))
}
