use std::time::Duration;
use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// The variants line up with how failures are retried: configuration and
/// database errors abort the current run, upstream errors wait for the next
/// trigger, credential errors fail every waiter on the in-flight refresh,
/// and timeouts are fatal to the process under the default policy.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
