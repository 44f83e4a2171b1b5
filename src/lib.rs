//! Daily ad performance metrics: ratio derivation, funnel and KPI totals,
//! and the HTTP surface the dashboard reads them from.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{DashboardError, DashboardResult, SchemaError};
pub use metrics::MetricsDeriver;
