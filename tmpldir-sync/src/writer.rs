//! Per-file rendering.
//!
//! ## `FileRenderer::render`, step by step
//!
//! 1. Read the template body from the source tree and parse it.
//! 2. Resolve the output path (the name is a template too).
//! 3. Create missing ancestor directories of the output, root first.
//! 4. Remove any stale copy of the template itself from the destination.
//! 5. Create/truncate the output file.
//! 6. Render the body straight into it.
//! 7. Flush; the handle is closed on every path when it goes out of scope.

use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tmpldir_core::{OutputSpec, ReadTree, TemplateTask, WriteTree};
use tmpldir_renderer::{BodyTemplate, OutputPathResolver};

use crate::error::{io_err, SyncError};

/// Renders single template files from a source tree into a destination tree.
pub struct FileRenderer<'a> {
    source: &'a dyn ReadTree,
    destination: &'a dyn WriteTree,
    context: &'a tera::Context,
    resolver: &'a OutputPathResolver,
}

impl<'a> FileRenderer<'a> {
    pub fn new(
        source: &'a dyn ReadTree,
        destination: &'a dyn WriteTree,
        context: &'a tera::Context,
        resolver: &'a OutputPathResolver,
    ) -> Self {
        Self {
            source,
            destination,
            context,
            resolver,
        }
    }

    /// Render `task` and write its output, replacing any previous artifact.
    pub fn render(&self, task: &TemplateTask) -> Result<OutputSpec, SyncError> {
        let src = task.path();
        let body = self
            .source
            .read_to_string(src)
            .map_err(|e| io_err(src, e))?;
        let template = BodyTemplate::parse(&src.to_string_lossy(), &body)?;

        let spec = self.resolver.resolve(src, self.context)?;
        let dest = spec.destination.as_path();

        if let Some(parent) = dest.parent() {
            mkdir_all(self.destination, parent)?;
        }
        remove_if_exists(self.destination, src)?;

        let file = self.destination.create(dest).map_err(|e| io_err(dest, e))?;
        let mut out = TrackedWriter::new(BufWriter::new(file));
        if let Err(err) = template.render_to(self.context, &mut out) {
            return Err(match out.take_error() {
                Some(write_err) => io_err(dest, write_err),
                None => err.into(),
            });
        }
        out.flush().map_err(|e| io_err(dest, e))?;

        tracing::debug!("rendered {} -> {}", src.display(), dest.display());
        Ok(spec)
    }
}

/// Create `dir` one segment at a time from the root down. Segments that
/// already exist are fine.
pub(crate) fn mkdir_all(tree: &dyn WriteTree, dir: &Path) -> Result<(), SyncError> {
    let mut accum = PathBuf::new();
    for component in dir.components() {
        if matches!(component, Component::CurDir) {
            continue;
        }
        accum.push(component);
        match tree.mkdir(&accum) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(&accum, e)),
        }
    }
    Ok(())
}

/// Remove `path` from `tree`; a missing entry is fine.
pub(crate) fn remove_if_exists(tree: &dyn WriteTree, path: &Path) -> Result<(), SyncError> {
    match tree.remove(path) {
        Ok(()) => {
            tracing::debug!("removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Remembers the first write failure, which the template engine would
/// otherwise report as a render error.
struct TrackedWriter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> TrackedWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if self.error.is_none() {
                self.error = Some(io::Error::new(e.kind(), e.to_string()));
            }
        }
        result
    }
}

impl<W: Write> Write for TrackedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.track(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use tmpldir_core::{DirTree, RenderContext, TEMPLATE_MARKER};
    use tmpldir_renderer::{to_tera_context, TemplateError};

    fn ctx() -> tera::Context {
        to_tera_context(
            &RenderContext::builder()
                .insert("Count", 42_i64)
                .insert("RepoName", "templatedir")
                .build(),
        )
        .unwrap()
    }

    fn render(src: &Path, dest: &Path, task: &str) -> Result<OutputSpec, SyncError> {
        let source = DirTree::new(src);
        let destination = DirTree::new(dest);
        let ctx = ctx();
        let resolver = OutputPathResolver::new(TEMPLATE_MARKER);
        FileRenderer::new(&source, &destination, &ctx, &resolver).render(&TemplateTask::from(task))
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn renders_into_nested_destination() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "dir1/dir2/file3.txt.template", "you pass {{.Count}}.");

        let spec = render(src.path(), dest.path(), "dir1/dir2/file3.txt.template").unwrap();

        assert_eq!(spec.destination, PathBuf::from("dir1/dir2/file3.txt"));
        let out = fs::read_to_string(dest.path().join("dir1/dir2/file3.txt")).unwrap();
        assert_eq!(out, "you pass 42.");
        assert!(src.path().join("dir1/dir2/file3.txt.template").exists());
    }

    #[test]
    fn templated_directory_names_are_created() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "{{.RepoName}}/conf.yaml.template", "n: {{.Count}}");

        render(src.path(), dest.path(), "{{.RepoName}}/conf.yaml.template").unwrap();

        let out = fs::read_to_string(dest.path().join("templatedir/conf.yaml")).unwrap();
        assert_eq!(out, "n: 42");
    }

    #[test]
    fn stale_template_copy_is_removed_and_output_truncated() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "a.txt.template", "{{.Count}}");
        write(dest.path(), "a.txt.template", "stale raw copy");
        write(dest.path(), "a.txt", "previous output that is longer");

        render(src.path(), dest.path(), "a.txt.template").unwrap();

        assert!(!dest.path().join("a.txt.template").exists());
        assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "42");
    }

    #[test]
    fn parse_error_happens_before_any_write() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "sub/bad.txt.template", "{{ Count ");

        let err = render(src.path(), dest.path(), "sub/bad.txt.template").unwrap_err();

        assert!(
            matches!(err, SyncError::Template(TemplateError::Parse { .. })),
            "got: {err}"
        );
        assert!(!dest.path().join("sub").exists());
    }

    #[test]
    fn missing_source_is_io_error() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let err = render(src.path(), dest.path(), "ghost.template").unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }

    /// Records every `mkdir` call in order.
    struct RecordingTree {
        inner: DirTree,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl WriteTree for RecordingTree {
        fn mkdir(&self, path: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            self.inner.mkdir(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path)
        }

        fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
            self.inner.create(path)
        }
    }

    #[test]
    fn mkdir_all_walks_from_root_and_tolerates_existing() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        let tree = RecordingTree {
            inner: DirTree::new(tmp.path()),
            calls: Mutex::new(Vec::new()),
        };

        mkdir_all(&tree, Path::new("a/b/c")).unwrap();

        assert_eq!(
            *tree.calls.lock().unwrap(),
            vec![
                PathBuf::from("a"),
                PathBuf::from("a/b"),
                PathBuf::from("a/b/c")
            ]
        );
        assert!(tmp.path().join("a/b/c").is_dir());
    }

    /// A destination whose files reject every write.
    struct BrokenWrites(DirTree);

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        }
    }

    impl WriteTree for BrokenWrites {
        fn mkdir(&self, path: &Path) -> io::Result<()> {
            self.0.mkdir(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.0.remove(path)
        }

        fn create(&self, _path: &Path) -> io::Result<Box<dyn Write + Send>> {
            Ok(Box::new(FailingWriter))
        }
    }

    #[test]
    fn write_failure_is_io_error_not_render_error() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "big.txt.template", &"{{.Count}}\n".repeat(4096));

        let source = DirTree::new(src.path());
        let destination = BrokenWrites(DirTree::new(dest.path()));
        let ctx = ctx();
        let resolver = OutputPathResolver::new(TEMPLATE_MARKER);
        let err = FileRenderer::new(&source, &destination, &ctx, &resolver)
            .render(&TemplateTask::from("big.txt.template"))
            .unwrap_err();

        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }

    /// Refuses every change.
    struct DeniedTree;

    fn denied() -> io::Error {
        io::Error::new(ErrorKind::PermissionDenied, "read-only tree")
    }

    impl WriteTree for DeniedTree {
        fn mkdir(&self, _path: &Path) -> io::Result<()> {
            Err(denied())
        }

        fn remove(&self, _path: &Path) -> io::Result<()> {
            Err(denied())
        }

        fn create(&self, _path: &Path) -> io::Result<Box<dyn Write + Send>> {
            Err(denied())
        }
    }

    #[test]
    fn mkdir_all_reports_the_failing_segment() {
        let err = mkdir_all(&DeniedTree, Path::new("a/b")).unwrap_err();
        match err {
            SyncError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("a"));
                assert_eq!(source.kind(), ErrorKind::PermissionDenied);
            }
            other => panic!("expected an I/O error, got: {other}"),
        }
    }

    #[test]
    fn remove_if_exists_only_ignores_missing_entries() {
        let err = remove_if_exists(&DeniedTree, Path::new("a.txt.template")).unwrap_err();
        match err {
            SyncError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("a.txt.template"));
                assert_eq!(source.kind(), ErrorKind::PermissionDenied);
            }
            other => panic!("expected an I/O error, got: {other}"),
        }

        let tmp = TempDir::new().unwrap();
        remove_if_exists(&DirTree::new(tmp.path()), Path::new("ghost.template")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_in_place_of_a_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), "not a directory").unwrap();
        let tree = DirTree::new(tmp.path());

        let err = mkdir_all(&tree, Path::new("a/b")).unwrap_err();
        assert!(
            matches!(&err, SyncError::Io { path, .. } if path == Path::new("a/b")),
            "got: {err}"
        );

        let err = remove_if_exists(&tree, Path::new("a/x.txt.template")).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
        assert!(tmp.path().join("a").is_file());
    }
}
