//! Error types for tms-provision
//!
//! One crate-wide [`Error`] covers both the core conditions of the provisioning
//! workflow (transport failures, failed or timed-out background jobs, fetch and
//! extraction failures) and the ambient ones (configuration, I/O, serialization).
//! The pipeline wraps step failures in [`Error::Step`] so callers always learn
//! which step broke and why.

use crate::types::PipelineStep;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tms-provision operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tms-provision
#[derive(Debug, Error)]
pub enum Error {
    /// Network/transport failure talking to the service; may be transient
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Transport failure without an underlying reqwest error (timeouts, client setup)
    #[error("transport error: {0}")]
    TransportMessage(String),

    /// The service answered with a non-success status
    #[error("service API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the error body, or the status reason
        message: String,
    },

    /// The background job reported a terminal failure
    #[error("background job {process_id} failed")]
    JobFailed {
        /// The failed process
        process_id: String,
    },

    /// Polling budget ran out (or was cancelled) before the job reached a terminal state
    ///
    /// The job may still be running on the server; its outcome is unknown.
    #[error("background job {process_id} did not finish after {attempts} attempt(s) in {elapsed:?}")]
    JobTimedOut {
        /// The process being polled
        process_id: String,
        /// Status queries performed
        attempts: u32,
        /// Wall-clock time spent polling
        elapsed: Duration,
    },

    /// Archive retrieval did not complete
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed {
        /// The archive URL
        url: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// What went wrong
        reason: String,
    },

    /// Archive bytes could not be parsed, or an entry was unsafe to write
    #[error("extraction failed for {path}: {reason}")]
    ExtractionFailed {
        /// The entry or directory involved
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A step could not start because a previous step's output was missing
    #[error("{step} cannot proceed: missing {missing}")]
    DependencyUnavailable {
        /// The step that could not start (the one after the step that came up empty)
        step: PipelineStep,
        /// The missing input
        missing: String,
    },

    /// A pipeline step failed
    #[error("step {step} failed: {source}")]
    Step {
        /// The failing step
        step: PipelineStep,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.max_attempts")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled between steps
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Attach the failing pipeline step to an error
    ///
    /// Errors that already carry a step are returned unchanged.
    pub fn in_step(self, step: PipelineStep) -> Self {
        match self {
            Error::Step { .. } | Error::DependencyUnavailable { .. } => self,
            other => Error::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The pipeline step this error was raised in, if any
    pub fn step(&self) -> Option<PipelineStep> {
        match self {
            Error::Step { step, .. } => Some(*step),
            Error::DependencyUnavailable { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The error with any step context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Transport(_) | Error::TransportMessage(_) => "transport_error",
            Error::Api { .. } => "api_error",
            Error::JobFailed { .. } => "job_failed",
            Error::JobTimedOut { .. } => "job_timed_out",
            Error::FetchFailed { .. } => "fetch_failed",
            Error::ExtractionFailed { .. } => "extraction_failed",
            Error::DependencyUnavailable { .. } => "dependency_unavailable",
            Error::Step { source, .. } => source.error_code(),
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
        }
    }

    /// Whether the job outcome is still unknown (as opposed to known-bad)
    ///
    /// True for [`Error::JobTimedOut`] and [`Error::Cancelled`], looking through step context.
    pub fn is_pending(&self) -> bool {
        matches!(self.root(), Error::JobTimedOut { .. } | Error::Cancelled)
    }
}
