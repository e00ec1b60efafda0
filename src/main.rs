//! nfanon - Flow Archive Anonymizer
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use nfanon::config::{AnonConfig, CliArgs};
use nfanon::pipeline::{Pipeline, ProgressEvent};
use nfanon::progress::{print_header, print_summary, ProgressReporter};
use nfanon::{nffile, Anonymizer};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit status for every failure mode: bad setup, file errors, corruption
const EXIT_FAILURE: u8 = 255;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.log_filter.as_deref())?;

    // Validate and create config
    let config = AnonConfig::from_args(args).context("Invalid configuration")?;

    // Key schedule is built once, before any worker exists
    let anonymizer = Arc::new(Anonymizer::with_key(&config.key));

    let files = nffile::discover_files(&config.input).context("No input to process")?;

    let pipeline = Pipeline::new(config.worker_count, config.output.clone(), anonymizer)
        .context("Failed to launch workers")?;

    // Print header
    if config.show_progress {
        let output = match &config.output {
            Some(path) => path.display().to_string(),
            None => "in place".to_string(),
        };
        print_header(
            &config.input.display().to_string(),
            pipeline.worker_count(),
            &output,
        );
    }

    let progress = if config.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let total_files = files.len();
    let result = pipeline.run(&files, |event| {
        if let Some(ref p) = progress {
            match event {
                ProgressEvent::File { index, path } => {
                    p.set_status(&format!(
                        "{}/{} Processing {}",
                        index + 1,
                        total_files,
                        path.display()
                    ));
                }
                ProgressEvent::Block { .. } => {}
            }
        }
    });

    match result {
        Ok(stats) => {
            if let Some(ref p) = progress {
                p.finish("Done");
            }
            if config.show_progress {
                print_summary(&stats);
            }
            Ok(())
        }
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            Err(e).context("Anonymization failed")
        }
    }
}

fn setup_logging(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("Invalid log filter '{}'", directive))?,
        None => EnvFilter::new("nfanon=warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
