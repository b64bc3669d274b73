//! File trees the pipeline reads from and writes to.
//!
//! Paths handed to a tree are always relative to its root and use `/`
//! semantics. [`DirTree`] maps them onto a directory on disk; [`SyncTree`]
//! serializes mutations for trees shared between worker threads.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use walkdir::WalkDir;

/// One entry produced by [`ReadTree::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the tree root.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Read-only traversal of a tree.
pub trait ReadTree: Send + Sync {
    /// Every entry below the root, lazily. The root itself is not yielded.
    fn walk(&self) -> Box<dyn Iterator<Item = io::Result<TreeEntry>> + '_>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Mutating operations on a tree.
///
/// Error kinds follow `std::fs`: `mkdir` on an existing entry fails with
/// [`io::ErrorKind::AlreadyExists`], `remove` of a missing entry with
/// [`io::ErrorKind::NotFound`].
pub trait WriteTree: Send + Sync {
    /// Create a single directory; the parent must exist.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Create or truncate a file for writing.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;
}

// ---------------------------------------------------------------------------
// DirTree
// ---------------------------------------------------------------------------

/// A tree rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root, refusing anything that could escape it.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes tree root: {}", path.display()),
                    ))
                }
            }
        }
        Ok(resolved)
    }
}

impl ReadTree for DirTree {
    fn walk(&self) -> Box<dyn Iterator<Item = io::Result<TreeEntry>> + '_> {
        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(move |entry| {
                let entry = entry.map_err(io::Error::from)?;
                let path = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                    .to_path_buf();
                Ok(TreeEntry {
                    path,
                    is_dir: entry.file_type().is_dir(),
                })
            });
        Box::new(entries)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.resolve(path)?)
    }
}

impl WriteTree for DirTree {
    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = fs::File::create(self.resolve(path)?)?;
        Ok(Box::new(file))
    }
}

// ---------------------------------------------------------------------------
// SyncTree
// ---------------------------------------------------------------------------

/// Serializes every mutation of the wrapped tree behind one lock.
///
/// Each `mkdir`/`remove`/`create` call runs alone. Writes through a handle
/// returned by `create` happen outside the lock; each handle belongs to a
/// single worker.
pub struct SyncTree<'a> {
    inner: &'a dyn WriteTree,
    lock: Mutex<()>,
}

impl<'a> SyncTree<'a> {
    pub fn new(inner: &'a dyn WriteTree) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }

    fn serialized<T>(&self, op: impl FnOnce(&dyn WriteTree) -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        op(self.inner)
    }
}

impl WriteTree for SyncTree<'_> {
    fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.serialized(|tree| tree.mkdir(path))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.serialized(|tree| tree.remove(path))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        self.serialized(|tree| tree.create(path))
    }
}
