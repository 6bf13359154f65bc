use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("no files match {0}")]
    NoMatch(String),

    #[error("PDF worker is not running")]
    WorkerGone,
}
