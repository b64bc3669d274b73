//! # tmpldir-sync
//!
//! Concurrent rendering of template trees.
//!
//! Call [`pipeline::run`] to render a directory in place or into another
//! directory, or build a [`RenderPipeline`] to render between arbitrary
//! [`ReadTree`](tmpldir_core::ReadTree) / [`WriteTree`](tmpldir_core::WriteTree)
//! implementations.

pub mod discover;
pub mod error;
pub mod latch;
pub mod pipeline;
pub mod writer;

pub use discover::TreeDiscoverer;
pub use error::SyncError;
pub use latch::ErrorLatch;
pub use pipeline::{PipelineConfig, RenderPipeline, RenderTarget, RunReport};
pub use writer::FileRenderer;
