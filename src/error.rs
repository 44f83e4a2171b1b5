use chrono::NaiveDate;
use thiserror::Error;

/// A tabular record that does not fit the daily row schema.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("missing column `{column}`{}", did_you_mean(.closest))]
    MissingColumn {
        column: &'static str,
        closest: Option<String>,
    },
    #[error("column `{column}` has malformed value `{value}`")]
    Malformed { column: &'static str, value: String },
    #[error("record is not an object")]
    NotARecord,
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

fn did_you_mean(closest: &Option<String>) -> String {
    match closest {
        Some(key) => format!(" (found `{}`, did you mean it?)", key),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("pull contains no rows")]
    EmptyPull,
    #[error("day {0} appears more than once in the pull")]
    DuplicateDay(NaiveDate),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
