use thiserror::Error;

/// Warehouse call outcomes the task needs to tell apart: recognized absence
/// and benign creation races get their own variants so callers recover from
/// exactly those and nothing else.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("bigquery api error (http {status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("query job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("malformed api response: {0}")]
    Malformed(String),
}
