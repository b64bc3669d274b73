//! `tmpldir [TARGET_DIR]` - render every template under a directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tmpldir_detector::default_context;
use tmpldir_sync::{
    pipeline::{self, RenderTarget},
    PipelineConfig, RunReport,
};

/// Arguments for `tmpldir`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Directory to render; defaults to the current directory.
    #[arg(value_name = "TARGET_DIR")]
    pub target: Option<PathBuf>,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let target = match self.target {
            Some(path) => path,
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let target = target
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", target.display()))?;

        println!("→ applying to directory {}", target.display());

        let context =
            default_context(&target).context("could not determine template context")?;
        tracing::debug!("template context:\n{context}");

        let result = pipeline::run(
            &RenderTarget::InPlace(target.clone()),
            &context,
            PipelineConfig::default(),
        );
        if result.is_err() {
            warn_partial_render();
        }
        let report = result.with_context(|| format!("render failed in '{}'", target.display()))?;

        print_report(&report);
        Ok(())
    }
}

/// In-place rendering removes each template before writing its output, so a
/// failed run cannot be retried from the same tree.
fn warn_partial_render() {
    eprintln!(
        "{} templates are replaced as they render: files handled before the failure \
         are already rendered, and the failing template may be gone with its output incomplete",
        "!".yellow().bold()
    );
}

fn print_report(report: &RunReport) {
    if report.rendered.is_empty() {
        println!("{} no templates found - nothing to do", "✓".green().bold());
        return;
    }

    println!(
        "{} rendered {} template(s)",
        "✓".green().bold(),
        report.rendered.len()
    );
    for spec in &report.rendered {
        println!(
            "  ✎  {} {} {}",
            spec.source.display(),
            "→".dimmed(),
            spec.destination.display()
        );
    }
}
