//! Output path resolution.
//!
//! | Source path                          | Output path                 |
//! |--------------------------------------|-----------------------------|
//! | `dir1/dir2/file3.txt.template`       | `dir1/dir2/file3.txt`       |
//! | `vars/{{.RepoName}}.yaml.template`   | `vars/templatedir.yaml`     |

use std::path::{Component, Path, PathBuf};

use tera::Tera;
use tmpldir_core::OutputSpec;

use crate::dialect;
use crate::error::TemplateError;

/// Maps a template's source path to the path of its rendered output.
#[derive(Debug, Clone)]
pub struct OutputPathResolver {
    marker: String,
}

impl OutputPathResolver {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Strip the marker from `source`, then evaluate what is left as a
    /// template against `ctx`.
    pub fn resolve(&self, source: &Path, ctx: &tera::Context) -> Result<OutputSpec, TemplateError> {
        let normalized = source.to_string_lossy().replace('\\', "/");
        let candidate = normalized
            .strip_suffix(self.marker.as_str())
            .unwrap_or(&normalized);

        let resolved = if candidate.contains('{') {
            let name_error = |source| TemplateError::Name {
                name: candidate.to_string(),
                source,
            };
            let translated = dialect::translate(candidate).map_err(name_error)?;
            Tera::one_off(&translated, ctx, false).map_err(name_error)?
        } else {
            candidate.to_string()
        };

        if !is_relative_file_path(&resolved) {
            return Err(TemplateError::InvalidOutputName {
                name: normalized,
                resolved,
            });
        }

        Ok(OutputSpec {
            source: source.to_path_buf(),
            destination: PathBuf::from(resolved),
        })
    }
}

fn is_relative_file_path(resolved: &str) -> bool {
    if resolved.is_empty() || resolved.ends_with('/') {
        return false;
    }
    let path = Path::new(resolved);
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && matches!(path.components().next_back(), Some(Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::to_tera_context;
    use rstest::rstest;
    use tmpldir_core::{RenderContext, TEMPLATE_MARKER};

    fn ctx() -> tera::Context {
        to_tera_context(
            &RenderContext::builder()
                .insert("Count", 42_i64)
                .insert("RepoName", "templatedir")
                .insert("Empty", "")
                .insert("Up", "..")
                .build(),
        )
        .unwrap()
    }

    fn resolve(source: &str) -> Result<OutputSpec, TemplateError> {
        OutputPathResolver::new(TEMPLATE_MARKER).resolve(Path::new(source), &ctx())
    }

    #[rstest]
    #[case("dir1/dir2/file3.txt.template", "dir1/dir2/file3.txt")]
    #[case("vars/{{.RepoName}}.yaml.template", "vars/templatedir.yaml")]
    #[case("{{ .RepoName }}/README.md.template", "templatedir/README.md")]
    #[case("{{if .Empty}}x{{else}}y{{end}}.txt.template", "y.txt")]
    #[case("{a}/{{.Count}}.template", "{a}/42")]
    #[case("n{{.Count}}.template", "n42")]
    fn resolves_output_paths(#[case] source: &str, #[case] expected: &str) {
        let spec = resolve(source).expect("resolve");
        assert_eq!(spec.source, PathBuf::from(source));
        assert_eq!(spec.destination, PathBuf::from(expected));
    }

    #[test]
    fn undefined_name_reference_is_name_error() {
        let err = resolve("{{.Missing}}.txt.template").unwrap_err();
        assert!(matches!(err, TemplateError::Name { .. }), "got: {err}");
    }

    #[test]
    fn malformed_name_template_is_name_error() {
        let err = resolve("{{ RepoName .txt.template").unwrap_err();
        assert!(matches!(err, TemplateError::Name { .. }), "got: {err}");
    }

    #[rstest]
    #[case(".template")]
    #[case("dir/{{.Empty}}.template")]
    #[case("{{.Up}}/escape.txt.template")]
    fn rejects_unusable_output_names(#[case] source: &str) {
        let err = resolve(source).unwrap_err();
        assert!(
            matches!(err, TemplateError::InvalidOutputName { .. }),
            "got: {err}"
        );
    }
}
