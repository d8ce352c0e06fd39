//! Background job completion polling
//!
//! [`await_completion`] queries a [`JobStatusSource`] until the job reaches a terminal
//! state or the [`PollingPolicy`] budget runs out. The three ways polling can end
//! badly stay distinct:
//!
//! - [`Error::JobFailed`]: the service said the job failed. Never retried.
//! - [`Error::JobTimedOut`]: attempts, wall-clock time, or the caller's patience ran
//!   out while the job was still pending. Its true outcome is unknown.
//! - A transport error: the final status query itself failed.
//!
//! # Example
//!
//! ```no_run
//! use tms_provision::config::PollingPolicy;
//! use tms_provision::poller::await_completion;
//! use tms_provision::types::RemoteJobHandle;
//! use tms_provision::{HttpServiceClient, ServiceConfig};
//!
//! # async fn example() -> tms_provision::Result<()> {
//! let client = HttpServiceClient::new(ServiceConfig::new("token"))?;
//! let handle = RemoteJobHandle::new("process-id", "project-id");
//! let status = await_completion(handle, &PollingPolicy::default(), &client).await?;
//! assert!(status.is_terminal());
//! # Ok(())
//! # }
//! ```

use crate::client::JobStatusSource;
use crate::config::PollingPolicy;
use crate::error::{Error, Result};
use crate::types::{JobStatus, RemoteJobHandle};
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, rate limiting, 5xx) return `true`.
/// Permanent failures (bad credentials, unknown process, undecodable bodies) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::TransportMessage(_) => true,
            // Request timeout, rate limiting and server-side trouble
            Error::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::Step { source, .. } => source.is_retryable(),
            Error::JobFailed { .. }
            | Error::JobTimedOut { .. }
            | Error::FetchFailed { .. }
            | Error::ExtractionFailed { .. }
            | Error::DependencyUnavailable { .. }
            | Error::Config { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Cancelled => false,
        }
    }
}

/// Poll until the job behind `handle` finishes, fails, or the policy budget runs out
///
/// Returns `Ok(JobStatus::Finished)` on success. Performs at most
/// `policy.max_attempts` status queries, sleeping (without blocking the runtime)
/// between them.
pub async fn await_completion<S>(
    handle: RemoteJobHandle,
    policy: &PollingPolicy,
    source: &S,
) -> Result<JobStatus>
where
    S: JobStatusSource + ?Sized,
{
    await_completion_with_cancel(handle, policy, source, &CancellationToken::new()).await
}

/// [`await_completion`] that also stops when `cancel` fires
///
/// Cancellation interrupts an in-flight query or a pending sleep and returns
/// [`Error::JobTimedOut`]: the job is still out there, we just stopped watching.
pub async fn await_completion_with_cancel<S>(
    handle: RemoteJobHandle,
    policy: &PollingPolicy,
    source: &S,
    cancel: &CancellationToken,
) -> Result<JobStatus>
where
    S: JobStatusSource + ?Sized,
{
    policy.validate()?;

    let started = Instant::now();
    // A timeout too large to represent is no deadline at all
    let deadline = policy
        .overall_timeout
        .and_then(|timeout| started.checked_add(timeout));
    let mut delay = policy.interval;
    let mut attempts: u32 = 0;
    let mut last_error: Option<Error>;

    tracing::debug!(
        process_id = handle.process_id(),
        max_attempts = policy.max_attempts,
        interval_ms = policy.interval.as_millis(),
        "waiting for background job"
    );

    loop {
        if cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(timed_out(&handle, attempts, started));
        }

        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = deadline_reached(deadline) => None,
            result = source.job_status(&handle) => Some(result),
        };
        let Some(result) = result else {
            return Err(timed_out(&handle, attempts, started));
        };

        match result {
            Ok(JobStatus::Finished) => {
                tracing::info!(
                    process_id = handle.process_id(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis(),
                    "background job finished"
                );
                return Ok(JobStatus::Finished);
            }
            Ok(JobStatus::Failed) => {
                tracing::error!(
                    process_id = handle.process_id(),
                    attempts,
                    "background job failed"
                );
                return Err(Error::JobFailed {
                    process_id: handle.process_id().to_string(),
                });
            }
            Ok(status) => {
                tracing::debug!(
                    process_id = handle.process_id(),
                    attempt = attempts,
                    %status,
                    "background job still pending"
                );
                last_error = None;
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    process_id = handle.process_id(),
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "status query failed, will retry"
                );
                last_error = Some(e);
            }
            Err(e) => {
                tracing::error!(
                    process_id = handle.process_id(),
                    attempt = attempts,
                    error = %e,
                    "status query failed with non-retryable error"
                );
                return Err(e);
            }
        }

        if attempts >= policy.max_attempts {
            // A failed final query is reported as itself, not as a timeout
            return Err(match last_error {
                Some(e) => e,
                None => timed_out(&handle, attempts, started),
            });
        }

        let wait = if policy.jitter {
            add_jitter(delay)
        } else {
            delay
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(timed_out(&handle, attempts, started)),
            _ = deadline_reached(deadline) => return Err(timed_out(&handle, attempts, started)),
            _ = tokio::time::sleep(wait) => {}
        }

        delay = policy.next_delay(delay);
    }
}

fn timed_out(handle: &RemoteJobHandle, attempts: u32, started: Instant) -> Error {
    let elapsed = started.elapsed();
    tracing::warn!(
        process_id = handle.process_id(),
        attempts,
        elapsed_ms = elapsed.as_millis(),
        "gave up waiting for background job"
    );
    Error::JobTimedOut {
        process_id: handle.process_id().to_string(),
        attempts,
        elapsed,
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let extra = Duration::try_from_secs_f64(delay.as_secs_f64() * jitter_factor).unwrap_or(delay);
    delay.saturating_add(extra.min(delay))
}
