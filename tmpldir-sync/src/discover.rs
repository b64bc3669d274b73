//! Template discovery.
//!
//! [`TreeDiscoverer::tasks`] lazily yields every non-directory entry whose name
//! ends with the template marker. `produce` feeds those tasks into the
//! pipeline's hand-off channel and reports the walk's terminal status.

use std::io;
use std::path::Path;
use std::sync::mpsc::SyncSender;

use tmpldir_core::{ReadTree, TemplateTask, TreeEntry};

use crate::error::SyncError;

/// Finds template files in a tree.
pub struct TreeDiscoverer<'a> {
    tree: &'a dyn ReadTree,
    marker: &'a str,
}

impl<'a> TreeDiscoverer<'a> {
    pub fn new(tree: &'a dyn ReadTree, marker: &'a str) -> Self {
        Self { tree, marker }
    }

    /// Template tasks in traversal order. A traversal fault is yielded once
    /// as [`SyncError::Discovery`] and ends the sequence.
    pub fn tasks(&self) -> Tasks<'a> {
        Tasks {
            entries: self.tree.walk(),
            marker: self.marker,
            done: false,
        }
    }
}

/// Iterator returned by [`TreeDiscoverer::tasks`].
pub struct Tasks<'a> {
    entries: Box<dyn Iterator<Item = io::Result<TreeEntry>> + 'a>,
    marker: &'a str,
    done: bool,
}

impl Iterator for Tasks<'_> {
    type Item = Result<TemplateTask, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.entries.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(source)) => {
                    self.done = true;
                    return Some(Err(SyncError::Discovery { source }));
                }
                Some(Ok(entry)) if !entry.is_dir && is_template(&entry.path, self.marker) => {
                    return Some(Ok(TemplateTask(entry.path)));
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

fn is_template(path: &Path, marker: &str) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(marker))
}

/// Hand every task to `tx`, blocking until a worker takes it.
///
/// Returns the number of tasks handed off. Stops early, without error, once
/// every receiver is gone. Dropping `tx` on return closes the channel.
pub(crate) fn produce<I>(tasks: I, tx: SyncSender<TemplateTask>) -> Result<usize, SyncError>
where
    I: IntoIterator<Item = Result<TemplateTask, SyncError>>,
{
    let mut sent = 0;
    for task in tasks {
        let task = task?;
        if tx.send(task).is_err() {
            tracing::debug!("all workers stopped; ending discovery after {sent} task(s)");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
