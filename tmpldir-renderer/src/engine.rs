//! Tera-backed template bodies.
//!
//! A [`BodyTemplate`] is parsed once per file and rendered straight into the
//! destination writer. Autoescaping is off: outputs are arbitrary text files,
//! whatever their extension.

use std::io::Write;

use tera::Tera;

use crate::dialect;
use crate::error::TemplateError;

/// One parsed template body.
pub struct BodyTemplate {
    tera: Tera,
    name: String,
}

impl BodyTemplate {
    /// Parse `source` under `name` (used in error messages).
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let parse_error = |source| TemplateError::Parse {
            name: name.to_string(),
            source,
        };
        let translated = dialect::translate(source).map_err(parse_error)?;
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(name, &translated)
            .map_err(parse_error)?;
        Ok(BodyTemplate {
            tera,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render into `out` as the template executes.
    pub fn render_to(&self, ctx: &tera::Context, out: impl Write) -> Result<(), TemplateError> {
        self.tera
            .render_to(&self.name, ctx, out)
            .map_err(|source| self.render_error(source))
    }

    /// Render into a `String`.
    pub fn render(&self, ctx: &tera::Context) -> Result<String, TemplateError> {
        self.tera
            .render(&self.name, ctx)
            .map_err(|source| self.render_error(source))
    }

    fn render_error(&self, source: tera::Error) -> TemplateError {
        TemplateError::Render {
            name: self.name.clone(),
            source,
        }
    }
}

/// Parse and render `source` in one step.
pub fn render_str(name: &str, source: &str, ctx: &tera::Context) -> Result<String, TemplateError> {
    BodyTemplate::parse(name, source)?.render(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::to_tera_context;
    use tmpldir_core::RenderContext;

    fn count_ctx() -> tera::Context {
        to_tera_context(&RenderContext::builder().insert("Count", 42_i64).build()).unwrap()
    }

    #[test]
    fn go_style_reference_renders() {
        let out = render_str("a.txt", "you pass {{.Count}}.", &count_ctx()).unwrap();
        assert_eq!(out, "you pass 42.");
    }

    #[test]
    fn control_actions_render() {
        let out = render_str(
            "a.txt",
            "{{if gt .Count 10}}big {{ .Count }}{{else}}small{{end}}",
            &count_ctx(),
        )
        .unwrap();
        assert_eq!(out, "big 42");
    }

    #[test]
    fn tera_delimiters_are_plain_text() {
        let out = render_str("a.sh", "{% raw %} {# x #} {{.Count}}", &count_ctx()).unwrap();
        assert_eq!(out, "{% raw %} {# x #} 42");
    }

    #[test]
    fn unknown_function_is_parse_error() {
        let err = BodyTemplate::parse("f.txt", "{{ upper .Count }}").err().expect("parse error");
        assert!(matches!(err, TemplateError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains(r#"function "upper" not defined"#), "got: {err}");
    }

    #[test]
    fn html_outputs_are_not_escaped() {
        let ctx = to_tera_context(&RenderContext::builder().insert("Tag", "<b>").build()).unwrap();
        let out = render_str("index.html", "{{.Tag}}", &ctx).unwrap();
        assert_eq!(out, "<b>");
    }

    #[test]
    fn syntax_fault_is_parse_error() {
        let err = BodyTemplate::parse("bad.txt", "{{ Count ").err().expect("parse error");
        assert!(matches!(err, TemplateError::Parse { .. }), "got: {err}");
        assert_eq!(err.name(), Some("bad.txt"));
    }

    #[test]
    fn undefined_reference_is_render_error() {
        let tpl = BodyTemplate::parse("missing.txt", "{{.Nope}}").unwrap();
        let err = tpl.render(&count_ctx()).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }), "got: {err}");
        assert!(err.to_string().contains("Nope"), "got: {err}");
    }

    #[test]
    fn render_to_streams_into_writer() {
        let tpl = BodyTemplate::parse("a.txt", "n={{.Count}}").unwrap();
        let mut buf = Vec::new();
        tpl.render_to(&count_ctx(), &mut buf).unwrap();
        assert_eq!(buf, b"n=42");
    }
}
