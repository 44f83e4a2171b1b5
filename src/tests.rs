use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use crate::api::{router, AppState};

fn app(db: &NamedTempFile) -> Router {
    router(AppState {
        db_path: db.path().to_path_buf(),
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn tabular_pull() -> Value {
    json!([
        {
            "day": "2024-01-01", "spend": 100, "impressions": 1000, "link_clicks": 50,
            "landing_page_views": 40, "checkouts_initiated": 10, "purchases": 2,
            "purchase_revenue": 400, "cost_per_purchase": 50
        },
        {
            "Day": "2024-01-02", "Amount Spent": 30, "Impressions": 0, "Link Clicks": 0,
            "Landing Page Views": 0, "Checkouts Initiated": 0, "Purchases": 0,
            "Purchase Conversion Value": 0, "Cost per Purchase": null
        },
        {
            "day": "2024-01-03", "spend": 70, "impressions": 2000, "link_clicks": 60,
            "landing_page_views": 45, "checkouts_initiated": 9, "purchases": 3,
            "purchase_revenue": 500, "cost_per_purchase": 23.33
        }
    ])
}

#[tokio::test]
async fn test_health_and_root() {
    let db = NamedTempFile::new().unwrap();

    let (status, body) = send(app(&db), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(app(&db), get("/")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_summary_for_single_day() {
    let db = NamedTempFile::new().unwrap();
    let (status, _) = send(app(&db), post_json("/pulls/rows", tabular_pull())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app(&db),
        get("/metrics/summary?start=2024-01-01&end=2024-01-01"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "total_spend": 100.0,
            "total_purchases": 2,
            "cac": 50.0,
            "total_revenue": 400.0,
            "roas": 4.0
        })
    );
}

#[tokio::test]
async fn test_infinite_ratio_serializes_as_null() {
    let db = NamedTempFile::new().unwrap();
    send(app(&db), post_json("/pulls/rows", tabular_pull())).await;

    let (status, body) = send(app(&db), get("/metrics/derived")).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["ctr"], json!(0.05));
    assert_eq!(rows[0]["day"], "2024-01-01");
    assert_eq!(rows[1]["ctr"], Value::Null);
    assert_eq!(rows[1]["checkout_conversion_rate"], Value::Null);
}

#[tokio::test]
async fn test_out_of_range_selection_is_clamped() {
    let db = NamedTempFile::new().unwrap();
    send(app(&db), post_json("/pulls/rows", tabular_pull())).await;

    let (status, body) = send(
        app(&db),
        get("/metrics/funnel?start=2020-01-01&end=2030-12-31"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let totals: Vec<(String, u64)> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["stage"].as_str().unwrap().to_string(), s["total"].as_u64().unwrap()))
        .collect();
    assert_eq!(
        totals,
        vec![
            ("Impressions".to_string(), 3000),
            ("Link Clicks".to_string(), 110),
            ("Landing Page Views".to_string(), 85),
            ("Checkouts Initiated".to_string(), 19),
            ("Purchases".to_string(), 5),
        ]
    );

    // reversed bounds select the same days
    let (_, reversed) = send(
        app(&db),
        get("/metrics/funnel?start=2030-12-31&end=2020-01-01"),
    )
    .await;
    assert_eq!(reversed, body);
}

#[tokio::test]
async fn test_missing_column_is_rejected() {
    let db = NamedTempFile::new().unwrap();
    let mut pull = tabular_pull();
    pull[0].as_object_mut().unwrap().remove("link_clicks");

    let (status, body) = send(app(&db), post_json("/pulls/rows", pull)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("link_clicks"));

    let (_, rows) = send(app(&db), get("/rows")).await;
    assert_eq!(rows, json!([]));
}

#[tokio::test]
async fn test_counts_out_of_range_or_fractional_are_rejected() {
    let db = NamedTempFile::new().unwrap();

    for (column, value) in [("impressions", json!(1e19)), ("purchases", json!("2.5"))] {
        let mut pull = tabular_pull();
        pull[0][column] = value;

        let (status, body) = send(app(&db), post_json("/pulls/rows", pull)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{column}");
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains(column));
    }

    let (_, rows) = send(app(&db), get("/rows")).await;
    assert_eq!(rows, json!([]));
}

#[tokio::test]
async fn test_largest_count_is_stored_exactly() {
    let db = NamedTempFile::new().unwrap();
    let mut pull = tabular_pull();
    pull[0]["impressions"] = json!(i64::MAX.to_string());

    let (status, _) = send(app(&db), post_json("/pulls/rows", pull)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, rows) = send(app(&db), get("/rows")).await;
    assert_eq!(rows[0]["impressions"], json!(i64::MAX as u64));
    assert_eq!(rows[1]["reported_roas"], Value::Null);
}

#[tokio::test]
async fn test_insight_missing_field_gets_error_envelope() {
    let db = NamedTempFile::new().unwrap();
    let insights = json!([{
        "date_start": "2024-04-10",
        "impressions": "3000",
        "inline_link_clicks": "90"
    }]);

    let (status, body) = send(app(&db), post_json("/pulls/insights", insights)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("spend"));
}

#[tokio::test]
async fn test_empty_and_duplicate_pulls_are_rejected() {
    let db = NamedTempFile::new().unwrap();

    let (status, _) = send(app(&db), post_json("/pulls/rows", json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut pull = tabular_pull();
    pull[2]["day"] = json!("2024-01-01");
    let (status, body) = send(app(&db), post_json("/pulls/rows", pull)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("2024-01-01"));
}

#[tokio::test]
async fn test_latest_pull() {
    let db = NamedTempFile::new().unwrap();

    let (status, _) = send(app(&db), get("/pulls/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stored) = send(app(&db), post_json("/pulls/rows", tabular_pull())).await;
    let (status, latest) = send(app(&db), get("/pulls/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], stored["data"]["pull"]["id"]);
    assert_eq!(latest["row_count"], 3);
}

#[tokio::test]
async fn test_insights_pull_is_flattened() {
    let db = NamedTempFile::new().unwrap();
    let insights = json!([
        {
            "date_start": "2024-04-10",
            "date_stop": "2024-04-10",
            "spend": "90.00",
            "impressions": "3000",
            "inline_link_clicks": "90",
            "actions": [
                {"action_type": "landing_page_view", "value": "70"},
                {"action_type": "initiate_checkout", "value": "9"},
                {"action_type": "purchase", "value": "3"}
            ],
            "action_values": [
                {"action_type": "onsite_web_app_purchase", "value": "540.00"}
            ],
            "purchase_roas": [{"action_type": "omni_purchase", "value": "6.0"}]
        }
    ]);

    let (status, body) = send(app(&db), post_json("/pulls/insights", insights)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pull"]["row_count"], 1);

    let (_, rows) = send(app(&db), get("/rows")).await;
    assert_eq!(rows[0]["reported_roas"], json!(6.0));
    assert_eq!(rows[0]["landing_page_views"], 70);
    assert_eq!(rows[0]["purchases"], 3);
    assert_eq!(rows[0]["purchase_revenue"], json!(540.0));
    assert_eq!(rows[0]["cost_per_purchase"], json!(30.0));
}

#[tokio::test]
async fn test_dashboard_view() {
    let db = NamedTempFile::new().unwrap();
    send(app(&db), post_json("/pulls/rows", tabular_pull())).await;

    let (status, view) = send(app(&db), get("/dashboard?start=2024-01-02")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(view["bounds"], json!({"start": "2024-01-01", "end": "2024-01-03"}));
    assert_eq!(view["range"], json!({"start": "2024-01-02", "end": "2024-01-03"}));
    assert!(view["last_updated"].is_string());
    assert_eq!(view["rates"].as_array().unwrap().len(), 2);
    assert_eq!(view["kpi_series"][1]["purchases_label"], "3");
    assert_eq!(view["cards"][0]["display"], "R$ 100,00");
    assert_eq!(view["summary"]["total_purchases"], 3);
}

#[tokio::test]
async fn test_dashboard_without_data() {
    let db = NamedTempFile::new().unwrap();

    let (status, view) = send(app(&db), get("/dashboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["range"], Value::Null);
    assert_eq!(view["funnel"][4]["total"], 0);
}
