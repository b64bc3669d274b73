//! Engine-side view of a [`RenderContext`].

use tmpldir_core::RenderContext;

use crate::error::TemplateError;

/// Convert a [`RenderContext`] to a [`tera::Context`].
///
/// Done once per run; the result is shared read-only by every worker.
pub fn to_tera_context(ctx: &RenderContext) -> Result<tera::Context, TemplateError> {
    tera::Context::from_serialize(ctx).map_err(TemplateError::Context)
}
