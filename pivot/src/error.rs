use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Only one aggregation axis may group by query")]
    MultipleQueryAxes,

    #[error("Unknown field '{field}' on index '{index}'")]
    FieldResolution { field: String, index: String },

    #[error("Invalid histogram interval '{0}': expected a numeric bucket width")]
    InvalidInterval(String),

    #[error("Aggregation failed on {failed} of {total} shards: {reason}")]
    ShardFailure {
        failed: u64,
        total: u64,
        reason: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Unexpected backend response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
