//! Flattening of per-day insight records exported from the ads platform's
//! reporting API into [`RawEventRow`]s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::models::{
    as_number, closest_key, parse_amount, parse_count, parse_day, Column, RawEventRow,
};

pub const LANDING_PAGE_VIEW: &str = "landing_page_view";
pub const PURCHASE: &str = "purchase";
pub const INITIATE_CHECKOUT: &str = "initiate_checkout";
pub const ONSITE_PURCHASE_VALUE: &str = "onsite_web_app_purchase";

const REQUIRED_FIELDS: [&str; 4] = ["date_start", "spend", "impressions", "inline_link_clicks"];
const OPTIONAL_FIELDS: [&str; 3] = ["actions", "action_values", "purchase_roas"];

/// One `{action_type, value}` entry of an insight's nested action lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionValue {
    pub action_type: String,
    pub value: Value,
}

/// A daily insight record as the reporting API returns it. Numbers arrive as strings;
/// fields the dashboard does not use are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRecord {
    pub date_start: Value,
    pub spend: Value,
    pub impressions: Value,
    pub inline_link_clicks: Value,
    #[serde(default)]
    pub actions: Option<Vec<ActionValue>>,
    #[serde(default)]
    pub action_values: Option<Vec<ActionValue>>,
    #[serde(default)]
    pub purchase_roas: Option<Vec<ActionValue>>,
}

/// Sums every action list entry by its type in one pass.
/// Entries whose value does not parse count as zero.
pub fn action_totals(actions: &[ActionValue]) -> HashMap<&str, f64> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for action in actions {
        *totals.entry(action.action_type.as_str()).or_insert(0.0) += as_number(&action.value).unwrap_or(0.0);
    }
    totals
}

impl InsightRecord {
    /// Reads one record of an exported pull, naming the first missing field.
    pub fn from_record(record: &Value) -> Result<Self, SchemaError> {
        let map = record.as_object().ok_or(SchemaError::NotARecord)?;

        if let Some(field) = REQUIRED_FIELDS.into_iter().find(|field| !map.contains_key(*field)) {
            return Err(SchemaError::MissingColumn {
                column: field,
                closest: closest_key(map, &[field], |candidate| {
                    REQUIRED_FIELDS.iter().chain(&OPTIONAL_FIELDS).any(|known| *known == candidate)
                }),
            });
        }

        serde_json::from_value(record.clone()).map_err(|e| SchemaError::MalformedRecord(e.to_string()))
    }

    pub fn to_row(&self) -> Result<RawEventRow, SchemaError> {
        let actions = action_totals(self.actions.as_deref().unwrap_or_default());
        let values = action_totals(self.action_values.as_deref().unwrap_or_default());
        let count = |action_type: &str, column: Column| {
            let total = actions.get(action_type).copied().unwrap_or(0.0);
            parse_count(&Value::from(total), column)
        };

        let spend = parse_amount(&self.spend, Column::Spend)?;
        let purchases = count(PURCHASE, Column::Purchases)?;

        Ok(RawEventRow {
            day: parse_day(&self.date_start, Column::Day)?,
            spend,
            impressions: parse_count(&self.impressions, Column::Impressions)?,
            link_clicks: parse_count(&self.inline_link_clicks, Column::LinkClicks)?,
            landing_page_views: count(LANDING_PAGE_VIEW, Column::LandingPageViews)?,
            checkouts_initiated: count(INITIATE_CHECKOUT, Column::CheckoutsInitiated)?,
            purchases,
            purchase_revenue: values.get(ONSITE_PURCHASE_VALUE).copied().unwrap_or(0.0),
            cost_per_purchase: if purchases > 0 {
                spend / purchases as f64
            } else {
                0.0
            },
            reported_roas: Some(self.reported_roas()),
        })
    }

    /// Platform-reported purchase ROAS: the first entry's value, 0 when absent or unparseable.
    pub fn reported_roas(&self) -> f64 {
        self.purchase_roas
            .as_deref()
            .and_then(|entries| entries.first())
            .and_then(|entry| as_number(&entry.value))
            .unwrap_or(0.0)
    }
}

/// Flattens a whole pull, stopping at the first record that does not fit the schema.
pub fn flatten(records: &[InsightRecord]) -> Result<Vec<RawEventRow>, SchemaError> {
    records.iter().map(InsightRecord::to_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(value: Value) -> InsightRecord {
        InsightRecord::from_record(&value).unwrap()
    }

    fn sample() -> InsightRecord {
        record(json!({
            "date_start": "2024-03-01",
            "date_stop": "2024-03-01",
            "spend": "120.00",
            "impressions": "4000",
            "inline_link_clicks": "80",
            "cpm": "30.0",
            "reach": "3500",
            "actions": [
                {"action_type": "link_click", "value": "80"},
                {"action_type": "landing_page_view", "value": "60"},
                {"action_type": "initiate_checkout", "value": "12"},
                {"action_type": "purchase", "value": "2"},
                {"action_type": "purchase", "value": "1"}
            ],
            "action_values": [
                {"action_type": "purchase", "value": "999.00"},
                {"action_type": "onsite_web_app_purchase", "value": "450.50"}
            ],
            "purchase_roas": [{"action_type": "omni_purchase", "value": "3.754"}]
        }))
    }

    #[test]
    fn test_action_totals_sums_repeated_types() {
        let insight = sample();
        let totals = action_totals(insight.actions.as_deref().unwrap());

        assert_eq!(totals.get("purchase"), Some(&3.0));
        assert_eq!(totals.get("landing_page_view"), Some(&60.0));
        assert_eq!(totals.get("video_view"), None);
    }

    #[test]
    fn test_to_row_projects_actions() {
        let row = sample().to_row().unwrap();

        assert_eq!(row.day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(row.spend, 120.0);
        assert_eq!(row.impressions, 4000);
        assert_eq!(row.link_clicks, 80);
        assert_eq!(row.landing_page_views, 60);
        assert_eq!(row.checkouts_initiated, 12);
        assert_eq!(row.purchases, 3);
        assert_eq!(row.purchase_revenue, 450.5);
        assert_eq!(row.cost_per_purchase, 40.0);
        assert_eq!(row.reported_roas, Some(3.754));
    }

    #[test]
    fn test_missing_action_lists_mean_zero() {
        let insight = record(json!({
            "date_start": "2024-03-02",
            "spend": "15.5",
            "impressions": "100",
            "inline_link_clicks": "3"
        }));

        let row = insight.to_row().unwrap();
        assert_eq!(row.landing_page_views, 0);
        assert_eq!(row.purchases, 0);
        assert_eq!(row.purchase_revenue, 0.0);
        assert_eq!(row.cost_per_purchase, 0.0);
        assert_eq!(insight.reported_roas(), 0.0);
    }

    #[test]
    fn test_reported_roas_first_entry() {
        assert_eq!(sample().reported_roas(), 3.754);

        let mut broken = sample();
        broken.purchase_roas = Some(vec![ActionValue {
            action_type: "omni_purchase".to_string(),
            value: json!("n/a"),
        }]);
        assert_eq!(broken.reported_roas(), 0.0);
    }

    #[test]
    fn test_flatten_reports_malformed_scalar() {
        let mut bad = sample();
        bad.impressions = json!("many");

        let err = flatten(&[sample(), bad]).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { column: "impressions", .. }));
    }

    #[test]
    fn test_from_record_names_missing_field() {
        let err = InsightRecord::from_record(&json!({
            "date_start": "2024-03-02",
            "spnd": "15.5",
            "impressions": "100",
            "inline_link_clicks": "3"
        }))
        .unwrap_err();

        assert_eq!(
            err,
            SchemaError::MissingColumn {
                column: "spend",
                closest: Some("spnd".to_string()),
            }
        );
        assert_eq!(InsightRecord::from_record(&json!("2024-03-02")).unwrap_err(), SchemaError::NotARecord);
    }

    #[test]
    fn test_from_record_rejects_malformed_action_list() {
        let err = InsightRecord::from_record(&json!({
            "date_start": "2024-03-02",
            "spend": "15.5",
            "impressions": "100",
            "inline_link_clicks": "3",
            "actions": "purchase"
        }))
        .unwrap_err();

        assert!(matches!(err, SchemaError::MalformedRecord(_)));
    }

    #[test]
    fn test_action_counts_must_be_whole_and_in_range() {
        let mut fractional = sample();
        fractional.actions = Some(vec![ActionValue {
            action_type: PURCHASE.to_string(),
            value: json!("2.5"),
        }]);
        assert!(matches!(
            fractional.to_row(),
            Err(SchemaError::Malformed { column: "purchases", .. })
        ));

        let mut huge = sample();
        huge.actions = Some(vec![ActionValue {
            action_type: LANDING_PAGE_VIEW.to_string(),
            value: json!("1e19"),
        }]);
        assert!(matches!(
            huge.to_row(),
            Err(SchemaError::Malformed { column: "landing_page_views", .. })
        ));
    }
}
