//! Typed errors for the clustering engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportFoldError {
    /// Misaligned parallel arrays out of the clusterer. Programmer error,
    /// never recovered: aborts the run.
    #[error(
        "length mismatch detected: reports={reports}, labels={labels}, embeddings={embeddings}"
    )]
    ShapeMismatch {
        reports: usize,
        labels: usize,
        embeddings: usize,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
