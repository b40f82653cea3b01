//! Error type for `kiln`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The analysis sample contained no usable JSON object.
    #[error("no rows for analysis")]
    EmptySample,

    #[error("sample size must be at least 1")]
    InvalidSampleSize,

    #[error("table not found in schema: {0}")]
    MissingTable(String),

    /// Insert-or-ignore followed by a re-select still found no row.
    #[error("symbol value could not be resolved in table {table}")]
    SymbolUnresolved { table: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
