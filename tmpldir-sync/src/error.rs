//! Error types for tmpldir-sync.

use std::path::PathBuf;

use thiserror::Error;

use tmpldir_renderer::TemplateError;

/// All errors that can arise from a render run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Walking the source tree failed.
    #[error("discovery failed: {source}")]
    Discovery {
        #[source]
        source: std::io::Error,
    },

    /// A template body or output name failed to parse or render.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A discovery or worker thread panicked.
    #[error("render thread panicked")]
    WorkerPanicked,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
