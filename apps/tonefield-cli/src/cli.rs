use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "tonefield")]
#[command(about = "Drive the tonefield pipeline through a scripted plugin timeline")]
pub struct Cli {
    /// JSON run config. Built-in defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the run duration in milliseconds.
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Tracing filter directive, e.g. `debug` or `tonefield_engine=trace`.
    #[arg(long)]
    pub log_filter: Option<String>,
}
