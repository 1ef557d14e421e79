use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors of the generation and placement library.
///
/// Non-fatal conditions never show up here; they are reported through a
/// [`DiagnosticSink`](crate::diagnostics::DiagnosticSink).
#[derive(Debug, Error)]
pub enum PackingError {
    /// Caller-side misconfiguration: missing geometry, mismatched column lengths, ...
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The nonlinear fit of a histogram did not converge within its bounds.
    #[error("Fit of '{stat}' did not converge: {reason}")]
    FitConvergence { stat: String, reason: String },

    /// A histogram that cannot be fitted at all (too few bins, no weight, ...).
    #[error("Invalid histogram: {0}")]
    InvalidHistogram(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PackingError>;

impl PackingError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PackingError::Configuration(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackingError::Io { path: path.into(), source }
    }
}
