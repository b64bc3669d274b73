//! tmpldir - render a directory of templates in place.
//!
//! # Usage
//!
//! ```text
//! tmpldir [TARGET_DIR]
//! ```
//!
//! Every `*.template` file below `TARGET_DIR` (default: the current
//! directory) is rendered against the detected context and replaced by its
//! output. Set `RUST_LOG=debug` for per-file logging.

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::render::RenderArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tmpldir",
    version,
    about = "Render a directory tree of templates in place",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    render: RenderArgs,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cli.render.run()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
