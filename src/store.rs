use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DashboardError, DashboardResult};
use crate::models::{PullInfo, RawEventRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pulls (
    id TEXT PRIMARY KEY,
    pulled_at TEXT NOT NULL,
    row_count INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS daily_rows (
    day TEXT PRIMARY KEY,
    spend REAL NOT NULL,
    impressions INTEGER NOT NULL,
    link_clicks INTEGER NOT NULL,
    landing_page_views INTEGER NOT NULL,
    checkouts_initiated INTEGER NOT NULL,
    purchases INTEGER NOT NULL,
    purchase_revenue REAL NOT NULL,
    cost_per_purchase REAL NOT NULL,
    reported_roas REAL,
    pull_id TEXT NOT NULL REFERENCES pulls(id)
);
";

/// Holds the rows of the latest pull.
/// A new pull replaces the previous dataset wholesale; nothing is edited in place.
pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open(path: &Path) -> DashboardResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn replace_pull(&mut self, rows: &[RawEventRow]) -> DashboardResult<PullInfo> {
        if rows.is_empty() {
            return Err(DashboardError::EmptyPull);
        }

        let mut seen = HashSet::new();
        for row in rows {
            if !seen.insert(row.day) {
                return Err(DashboardError::DuplicateDay(row.day));
            }
        }

        let pull = PullInfo {
            id: Uuid::new_v4(),
            pulled_at: Utc::now(),
            row_count: rows.len(),
        };

        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM daily_rows", [])?;
        tx.execute(
            "INSERT INTO pulls (id, pulled_at, row_count) VALUES (?1, ?2, ?3)",
            params![pull.id.to_string(), pull.pulled_at, pull.row_count],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO daily_rows (
                    day, spend, impressions, link_clicks, landing_page_views,
                    checkouts_initiated, purchases, purchase_revenue, cost_per_purchase,
                    reported_roas, pull_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for row in rows {
                insert.execute(params![
                    row.day,
                    row.spend,
                    row.impressions,
                    row.link_clicks,
                    row.landing_page_views,
                    row.checkouts_initiated,
                    row.purchases,
                    row.purchase_revenue,
                    row.cost_per_purchase,
                    row.reported_roas,
                    pull.id.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(removed, "Previous pull rows removed");
        info!(pull_id = %pull.id, rows = pull.row_count, "Pull stored");
        Ok(pull)
    }

    /// Rows of the current pull, ordered by day.
    pub fn load_rows(&self) -> DashboardResult<Vec<RawEventRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, spend, impressions, link_clicks, landing_page_views,
                    checkouts_initiated, purchases, purchase_revenue, cost_per_purchase,
                    reported_roas
             FROM daily_rows ORDER BY day",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RawEventRow {
                    day: row.get("day")?,
                    spend: row.get("spend")?,
                    impressions: row.get("impressions")?,
                    link_clicks: row.get("link_clicks")?,
                    landing_page_views: row.get("landing_page_views")?,
                    checkouts_initiated: row.get("checkouts_initiated")?,
                    purchases: row.get("purchases")?,
                    purchase_revenue: row.get("purchase_revenue")?,
                    cost_per_purchase: row.get("cost_per_purchase")?,
                    reported_roas: row.get("reported_roas")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn last_pull(&self) -> DashboardResult<Option<PullInfo>> {
        let pull = self
            .conn
            .query_row(
                "SELECT id, pulled_at, row_count FROM pulls ORDER BY rowid DESC LIMIT 1",
                [],
                |row| {
                    let id: String = row.get(0)?;
                    let id = Uuid::parse_str(&id).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                    })?;
                    Ok(PullInfo {
                        id,
                        pulled_at: row.get(1)?,
                        row_count: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(pull)
    }
}
