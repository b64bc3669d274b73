//! tmpldir core library - context values, task types, file trees.
//!
//! - [`types`]: [`RenderContext`], [`ContextValue`], [`TemplateTask`], [`OutputSpec`]
//! - [`tree`]: [`ReadTree`] / [`WriteTree`], [`DirTree`], [`SyncTree`]

pub mod tree;
pub mod types;

pub use tree::{DirTree, ReadTree, SyncTree, TreeEntry, WriteTree};
pub use types::{
    ContextValue, OutputSpec, RenderContext, RenderContextBuilder, TemplateTask, TEMPLATE_MARKER,
};
