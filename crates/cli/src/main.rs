// crates/cli/src/main.rs
//! `commitscope` binary.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use commitscope_pipeline::PipelineError;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn init_tracing() {
    let filter = std::env::var("COMMITSCOPE_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| "warn".into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Exit code for a failed invocation: the pipeline's code when the error
/// came from it, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map(|e| e.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
