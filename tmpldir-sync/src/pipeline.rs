//! Concurrent render pipeline.
//!
//! One discovery thread hands template paths to a fixed pool of workers over a
//! rendezvous channel, so at most one discovered task waits for a worker at
//! any time. The first failing render is kept in an [`ErrorLatch`]; workers
//! stop taking new tasks once it is set but always finish the file they are on.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tmpldir_core::{
    DirTree, OutputSpec, ReadTree, RenderContext, SyncTree, TemplateTask, WriteTree,
    TEMPLATE_MARKER,
};
use tmpldir_renderer::{to_tera_context, OutputPathResolver};

use crate::discover::{produce, TreeDiscoverer};
use crate::error::SyncError;
use crate::latch::ErrorLatch;
use crate::writer::FileRenderer;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of render workers. Never less than one.
    pub workers: usize,
    /// Filename suffix that marks template files.
    pub marker: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            marker: TEMPLATE_MARKER.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

/// Host parallelism, or one worker when it cannot be determined.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Template files handed to workers.
    pub discovered: usize,
    /// Rendered outputs, sorted by destination path.
    pub rendered: Vec<OutputSpec>,
}

/// Terminal state of a run before it is reduced to a single result.
struct RunOutcome {
    discovery_error: Option<SyncError>,
    render_error: Option<SyncError>,
}

impl RunOutcome {
    /// A discovery error takes precedence over a render error.
    fn into_result(self) -> Result<(), SyncError> {
        match (self.discovery_error, self.render_error) {
            (Some(discovery), render) => {
                if let Some(render) = render {
                    tracing::warn!("render error superseded by discovery error: {render}");
                }
                Err(discovery)
            }
            (None, Some(render)) => Err(render),
            (None, None) => Ok(()),
        }
    }
}

/// Renders every template of a source tree into a destination tree.
#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    config: PipelineConfig,
}

impl RenderPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render all templates found in `source` into `destination`.
    ///
    /// Blocks until discovery and every worker have finished. On failure,
    /// outputs rendered before the fault stay on disk.
    pub fn run(
        &self,
        source: &dyn ReadTree,
        destination: &dyn WriteTree,
        context: &RenderContext,
    ) -> Result<RunReport, SyncError> {
        let started = Instant::now();
        let workers = self.config.workers.max(1);
        let marker = self.config.marker.as_str();
        tracing::info!("rendering templates with {workers} worker(s)");

        let tera_ctx = to_tera_context(context)?;
        let destination = SyncTree::new(destination);
        let resolver = OutputPathResolver::new(marker);
        let renderer = FileRenderer::new(source, &destination, &tera_ctx, &resolver);
        let mut latch = ErrorLatch::new();
        let rendered = Mutex::new(Vec::new());

        let (discovery, panicked) = thread::scope(|s| {
            let (tx, rx) = mpsc::sync_channel::<TemplateTask>(0);
            let producer =
                s.spawn(move || produce(TreeDiscoverer::new(source, marker).tasks(), tx));

            let rx = Arc::new(Mutex::new(rx));
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let rx = Arc::clone(&rx);
                    let (latch, renderer, rendered) = (&latch, &renderer, &rendered);
                    s.spawn(move || work(id, &rx, latch, renderer, rendered))
                })
                .collect();
            // Once the last worker exits the receiver is gone, which releases
            // a producer blocked on hand-off.
            drop(rx);

            let mut panicked = false;
            for handle in handles {
                panicked |= handle.join().is_err();
            }
            let discovery = producer.join().unwrap_or_else(|_| {
                panicked = true;
                Ok(0)
            });
            (discovery, panicked)
        });

        if panicked {
            return Err(SyncError::WorkerPanicked);
        }

        let (discovered, discovery_error) = match discovery {
            Ok(count) => (count, None),
            Err(err) => (0, Some(err)),
        };
        RunOutcome {
            discovery_error,
            render_error: latch.drain(),
        }
        .into_result()?;

        let mut rendered = rendered.into_inner().unwrap_or_else(PoisonError::into_inner);
        rendered.sort_by(|a, b| a.destination.cmp(&b.destination));
        tracing::info!(
            "rendered {} file(s) in {:?}",
            rendered.len(),
            started.elapsed()
        );
        Ok(RunReport {
            discovered,
            rendered,
        })
    }
}

/// Worker loop: take tasks until the channel closes or a failure is latched.
fn work(
    id: usize,
    tasks: &Mutex<Receiver<TemplateTask>>,
    latch: &ErrorLatch<SyncError>,
    renderer: &FileRenderer<'_>,
    rendered: &Mutex<Vec<OutputSpec>>,
) {
    loop {
        if latch.is_set() {
            tracing::debug!("worker {id}: failure latched, stopping");
            return;
        }
        let next = match tasks.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return,
        };
        let Ok(task) = next else {
            return;
        };
        if latch.is_set() {
            tracing::debug!("worker {id}: dropping {task}, failure latched");
            return;
        }

        let result = renderer.render(&task).map(|spec| {
            rendered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(spec)
        });
        if let Err(err) = &result {
            tracing::debug!("worker {id}: {task} failed: {err}");
        }
        if latch.fail_on(result) {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Where a run reads templates and writes outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// Render next to the templates; each template is replaced by its output.
    InPlace(PathBuf),
    /// Render from one directory into another; the source is left untouched.
    Into {
        source: PathBuf,
        destination: PathBuf,
    },
}

/// Run the pipeline for a target directory layout.
///
/// This is the entrypoint used by the `tmpldir` binary.
pub fn run(
    target: &RenderTarget,
    context: &RenderContext,
    config: PipelineConfig,
) -> Result<RunReport, SyncError> {
    let pipeline = RenderPipeline::new(config);
    match target {
        RenderTarget::InPlace(root) => {
            let tree = DirTree::new(root);
            pipeline.run(&tree, &tree, context)
        }
        RenderTarget::Into {
            source,
            destination,
        } => pipeline.run(&DirTree::new(source), &DirTree::new(destination), context),
    }
}
