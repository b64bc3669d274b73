//! Error types for tmpldir-renderer.

use std::error::Error as _;

use thiserror::Error;

/// All errors that can arise while parsing or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template body is not valid template syntax.
    #[error("failed to parse template {name}: {}", describe(.source))]
    Parse {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// The output file name could not be parsed or evaluated as a template.
    #[error("failed to evaluate output name {name}: {}", describe(.source))]
    Name {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// The output file name evaluated to something that is not a relative file path.
    #[error("output name for {name} resolved to {resolved:?}, which is not a relative file path")]
    InvalidOutputName { name: String, resolved: String },

    /// Executing the template failed (undefined reference, type mismatch, ...).
    #[error("failed to render template {name}: {}", describe(.source))]
    Render {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// The render context could not be converted for the engine.
    #[error("context serialization error: {}", describe(.0))]
    Context(#[source] tera::Error),
}

impl TemplateError {
    /// Template or output name the error refers to, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            TemplateError::Parse { name, .. }
            | TemplateError::Name { name, .. }
            | TemplateError::InvalidOutputName { name, .. }
            | TemplateError::Render { name, .. } => Some(name),
            TemplateError::Context(_) => None,
        }
    }
}

/// Tera keeps the useful detail in the source chain; flatten it.
fn describe(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        cause = inner.source();
    }
    msg
}
