//! # tmpldir-renderer
//!
//! Tera-based template engine for tmpldir: parses template bodies, renders
//! them against a [`RenderContext`](tmpldir_core::RenderContext), and resolves
//! output file names, which are templates themselves. Templates are written
//! with Go-style `{{ }}` actions; [`dialect`] compiles them to Tera.
//!
//! ## Usage
//!
//! ```rust
//! use std::path::Path;
//! use tmpldir_core::{RenderContext, TEMPLATE_MARKER};
//! use tmpldir_renderer::{to_tera_context, BodyTemplate, OutputPathResolver};
//!
//! let ctx = RenderContext::builder().insert("Count", 42_i64).build();
//! let ctx = to_tera_context(&ctx).unwrap();
//!
//! let body = BodyTemplate::parse("score.txt.template", "you pass {{.Count}}.").unwrap();
//! assert_eq!(body.render(&ctx).unwrap(), "you pass 42.");
//!
//! let spec = OutputPathResolver::new(TEMPLATE_MARKER)
//!     .resolve(Path::new("score.txt.template"), &ctx)
//!     .unwrap();
//! assert_eq!(spec.destination, Path::new("score.txt"));
//! ```

pub mod context;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod resolver;

pub use context::to_tera_context;
pub use engine::{render_str, BodyTemplate};
pub use error::TemplateError;
pub use resolver::OutputPathResolver;
