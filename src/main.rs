//! Demo: provision a sample English/French project and download the translations
//!
//! Environment (a `.env` file is honoured):
//! - `API_KEY` - service API token (required)
//! - `TMS_BASE_URL` - API base URL (default: the public endpoint)
//! - `SOURCE_FILE` - source-language file to upload (default: `demos/i18n/en.json`)
//! - `TARGET_DIR` - where the bundle is unpacked (default: `demos/i18n`)
//! - `RUST_LOG` - log filter (default: `info`)

use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast::{self, error::RecvError};
use tms_provision::types::{ExtractionTarget, SourceFile};
use tms_provision::{
    Config, Error, Event, ProvisionPlan, ProvisionReport, ProvisioningPipeline, ServiceConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(report) => {
            println!("Done: task '{}' assigned to {}", report.task.title, report.contributor.email);
            for file in &report.extracted_files {
                println!("  {}", file.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "provisioning failed");
            eprintln!("error [{}]: {}", e.error_code(), e);
            if e.is_pending() {
                eprintln!("the upload may still be processing on the server");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> tms_provision::Result<ProvisionReport> {
    let api_token = std::env::var("API_KEY").map_err(|_| Error::Config {
        message: "API_KEY not set in environment".to_string(),
        key: Some("API_KEY".to_string()),
    })?;

    let mut service = ServiceConfig::new(api_token);
    if let Ok(base_url) = std::env::var("TMS_BASE_URL") {
        service = service.with_base_url(base_url);
    }

    let source_path = env_path("SOURCE_FILE", "demos/i18n/en.json");
    let target_dir = env_path("TARGET_DIR", "demos/i18n");

    let pipeline = ProvisioningPipeline::from_config(Config::new(service))?;
    tokio::spawn(tms_provision::cancel_on_signal(pipeline.cancellation_token()));

    tokio::spawn(print_events(pipeline.subscribe()));

    let source = SourceFile::read(&source_path, "en").await?;
    let plan = ProvisionPlan::sample(source, ExtractionTarget::new(target_dir));

    pipeline.run(&plan).await
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var_os(name)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Print progress until the pipeline goes away, returning how many events were shown
async fn print_events(mut events: broadcast::Receiver<Event>) -> usize {
    let mut shown = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                print_progress(&event);
                shown += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "progress output lagged behind");
            }
            Err(RecvError::Closed) => return shown,
        }
    }
}

fn print_progress(event: &Event) {
    match event {
        Event::StepStarted { step } => println!("-> {}", step),
        Event::JobPolled {
            process_id,
            attempt,
            status,
        } => println!("   process {} is {} (check #{})", process_id, status, attempt),
        Event::JobPollFailed { attempt, error, .. } => {
            println!("   status check #{} failed: {}", attempt, error)
        }
        Event::StepCompleted { .. } | Event::Aborted { .. } => {}
    }
}
