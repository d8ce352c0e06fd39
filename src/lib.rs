//! # tms-provision
//!
//! Provisioning workflow for a remote translation-management service.
//!
//! ## What it does
//!
//! One run of [`ProvisioningPipeline`]:
//! - creates a project and invites a translator
//! - uploads a source-language file and waits for the service to process it
//! - assigns a translation task covering the generated keys
//! - downloads the translated bundle and unpacks it locally
//!
//! The interesting parts are the background job poller ([`poller`]), which keeps
//! "failed", "still pending" and "could not ask" apart, and bundle extraction
//! ([`extraction`]), which never writes outside its target directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tms_provision::{Config, ProvisionPlan, ProvisioningPipeline, ServiceConfig};
//! use tms_provision::types::{ExtractionTarget, SourceFile};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(ServiceConfig::new("your-api-token"));
//!     let pipeline = ProvisioningPipeline::from_config(config)?;
//!
//!     // Cancel cleanly on Ctrl+C
//!     tokio::spawn(tms_provision::cancel_on_signal(pipeline.cancellation_token()));
//!
//!     let source = SourceFile::read(Path::new("i18n/en.json"), "en").await?;
//!     let plan = ProvisionPlan::sample(source, ExtractionTarget::new("i18n"));
//!
//!     let report = pipeline.run(&plan).await?;
//!     println!("Task '{}' created, {} files extracted", report.task.title, report.extracted_files.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Translation service client traits and HTTP implementation
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bundle extraction
pub mod extraction;
/// Bundle retrieval
pub mod fetch;
/// End-to-end provisioning workflow
pub mod pipeline;
/// Background job completion polling
pub mod poller;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::{ArchiveLocator, HttpServiceClient, JobStatusSource, TranslationService};
pub use config::{Config, FetchConfig, PollingPolicy, ServiceConfig};
pub use error::{Error, Result};
pub use extraction::ArchiveExtractor;
pub use fetch::ArchiveFetcher;
pub use pipeline::{ProvisionPlan, ProvisioningPipeline};
pub use poller::{IsRetryable, await_completion, await_completion_with_cancel};
pub use types::{
    ArchiveReference, Event, ExtractionTarget, JobStatus, PipelineStep, ProvisionReport,
    RemoteJobHandle,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
///
/// Meant to be spawned next to a pipeline run: a cancelled run stops before its next
/// step, and a pending status poll gives up immediately. Returns without cancelling
/// if `token` is cancelled some other way first.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        signal = stop_requested() => {
            tracing::info!(signal, "stop requested, cancelling provisioning run");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

/// Resolves with the name of the first stop signal received
#[cfg(unix)]
async fn stop_requested() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    // Containers may refuse SIGTERM registration; Ctrl+C alone still works then
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM unavailable, only Ctrl+C will cancel");
            None
        }
    };

    tokio::select! {
        Some(_) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        } => "SIGTERM",
        _ = interrupted() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn stop_requested() -> &'static str {
    interrupted().await;
    "Ctrl+C"
}

/// Waits for Ctrl+C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
