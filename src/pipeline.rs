//! End-to-end provisioning workflow
//!
//! [`ProvisioningPipeline::run`] executes the steps in [`PipelineStep::ALL`] order:
//! create project, invite contributors, upload the source file, wait for the upload
//! to be processed, list keys, create a task, request a bundle, fetch it, extract it.
//! Each step needs what the previous one produced; the first failure aborts the run
//! and comes back wrapped in [`Error::Step`] (or as [`Error::DependencyUnavailable`]
//! when a step returned successfully but empty-handed).
//!
//! Remote entities created before a failure are left in place.

use crate::client::{HttpServiceClient, JobStatusSource, TranslationService};
use crate::config::{Config, PollingPolicy};
use crate::error::{Error, Result};
use crate::extraction::ArchiveExtractor;
use crate::fetch::ArchiveFetcher;
use crate::poller::await_completion_with_cancel;
use crate::types::{
    ContributorLanguage, ContributorSpec, DownloadSpec, Event, ExtractionTarget, JobStatus,
    LanguageSpec, PipelineStep, ProjectSpec, ProvisionReport, RemoteJobHandle, SourceFile,
    TaskLanguageSpec, TaskSpec,
};
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Everything a provisioning run creates, uploads and downloads
#[derive(Clone, Debug)]
pub struct ProvisionPlan {
    /// Project to create
    pub project: ProjectSpec,
    /// Contributors to invite; the first one is assigned the task
    pub contributors: Vec<ContributorSpec>,
    /// Source-language file to upload
    pub source_file: SourceFile,
    /// Title of the translation task
    pub task_title: String,
    /// Language the task asks to translate into
    pub task_language: String,
    /// Bundle to request once the task exists
    pub download: DownloadSpec,
    /// Where the bundle gets unpacked
    pub target: ExtractionTarget,
}

impl ProvisionPlan {
    /// English-to-French sample project with one reviewer translator
    pub fn sample(source_file: SourceFile, target: ExtractionTarget) -> Self {
        Self {
            project: ProjectSpec {
                name: "Rust Sample Project".to_string(),
                description: "Here's my Rust project".to_string(),
                languages: vec![LanguageSpec::new("en"), LanguageSpec::new("fr")],
                base_lang_iso: "en".to_string(),
            },
            contributors: vec![ContributorSpec {
                email: "translator@example.com".to_string(),
                fullname: "Mr. Translator".to_string(),
                is_admin: false,
                is_reviewer: true,
                languages: vec![
                    ContributorLanguage {
                        lang_iso: "en".to_string(),
                        is_writable: false,
                    },
                    ContributorLanguage {
                        lang_iso: "fr".to_string(),
                        is_writable: true,
                    },
                ],
            }],
            source_file,
            task_title: "Translate French".to_string(),
            task_language: "fr".to_string(),
            download: DownloadSpec::json(vec!["fr".to_string()]),
            target,
        }
    }
}

/// Runs the provisioning workflow against a [`TranslationService`]
///
/// # Example
///
/// ```no_run
/// use tms_provision::{Config, ProvisionPlan, ProvisioningPipeline, ServiceConfig};
/// use tms_provision::types::{ExtractionTarget, SourceFile};
/// use std::path::Path;
///
/// # async fn example() -> tms_provision::Result<()> {
/// let pipeline = ProvisioningPipeline::from_config(Config::new(ServiceConfig::new("token")))?;
///
/// let mut events = pipeline.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let source = SourceFile::read(Path::new("i18n/en.json"), "en").await?;
/// let plan = ProvisionPlan::sample(source, ExtractionTarget::new("i18n"));
/// let report = pipeline.run(&plan).await?;
/// println!("{} files extracted", report.extracted_files.len());
/// # Ok(())
/// # }
/// ```
pub struct ProvisioningPipeline<C> {
    client: C,
    fetcher: ArchiveFetcher,
    policy: PollingPolicy,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl ProvisioningPipeline<HttpServiceClient> {
    /// Build a pipeline talking to the service over HTTP
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = ArchiveFetcher::new(&config.fetch)?;
        let client = HttpServiceClient::new(config.service)?;
        Ok(Self::new(client, fetcher, config.polling))
    }
}

impl<C: TranslationService> ProvisioningPipeline<C> {
    /// Create a pipeline from its collaborators
    pub fn new(client: C, fetcher: ArchiveFetcher, policy: PollingPolicy) -> Self {
        let (event_tx, _rx) = broadcast::channel(256);
        Self {
            client,
            fetcher,
            policy,
            cancel: CancellationToken::new(),
            event_tx,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this pipeline's runs
    ///
    /// Cancelling stops the run before the next step starts; a pending status poll
    /// gives up immediately with [`Error::JobTimedOut`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run every step once
    pub async fn run(&self, plan: &ProvisionPlan) -> Result<ProvisionReport> {
        let started_at = Utc::now();
        info!(project = %plan.project.name, "starting provisioning run");

        let project = self
            .step(
                PipelineStep::CreateProject,
                self.client.create_project(&plan.project),
            )
            .await?;
        if project.project_id.trim().is_empty() {
            return Err(self.unavailable(PipelineStep::InviteContributors, "project id"));
        }
        let project_id = project.project_id.as_str();

        let contributors = self
            .step(
                PipelineStep::InviteContributors,
                self.client
                    .create_contributors(project_id, &plan.contributors),
            )
            .await?;
        let Some(contributor) = contributors.into_iter().next() else {
            return Err(self.unavailable(PipelineStep::UploadFile, "contributor user_id"));
        };

        let handle = self
            .step(
                PipelineStep::UploadFile,
                self.client.upload_file(project_id, &plan.source_file),
            )
            .await?;
        if handle.process_id().trim().is_empty() {
            return Err(self.unavailable(PipelineStep::AwaitProcessing, "process id"));
        }
        let process_id = handle.process_id().to_string();

        let observed = ObservedStatusSource::new(&self.client, &self.event_tx);
        self.step(
            PipelineStep::AwaitProcessing,
            await_completion_with_cancel(handle, &self.policy, &observed, &self.cancel),
        )
        .await?;
        let poll_attempts = observed.attempts();

        let key_ids = self
            .step(PipelineStep::ListKeys, self.client.list_keys(project_id))
            .await?;
        if key_ids.is_empty() {
            return Err(self.unavailable(PipelineStep::CreateTask, "key ids"));
        }

        let task_spec = TaskSpec {
            title: plan.task_title.clone(),
            keys: key_ids.clone(),
            languages: vec![TaskLanguageSpec {
                language_iso: plan.task_language.clone(),
                users: vec![contributor.user_id],
            }],
        };
        let task = self
            .step(
                PipelineStep::CreateTask,
                self.client.create_task(project_id, &task_spec),
            )
            .await?;

        let reference = self
            .step(
                PipelineStep::RequestDownload,
                self.client.request_download(project_id, &plan.download),
            )
            .await?;
        let bundle_url = reference.url.clone();

        let bytes = self
            .step(PipelineStep::FetchBundle, self.fetcher.fetch(reference))
            .await?;

        let extracted = self
            .step(
                PipelineStep::ExtractBundle,
                ArchiveExtractor::extract_async(bytes, plan.target.clone()),
            )
            .await?;

        info!(
            project_id,
            task_id = task.task_id,
            files = extracted.len(),
            "provisioning run complete"
        );

        Ok(ProvisionReport {
            project,
            contributor,
            process_id,
            poll_attempts,
            key_ids,
            task,
            bundle_url,
            extracted_files: extracted.into_iter().collect(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run one step, emitting progress events and attaching step context to failures
    async fn step<T, F>(&self, step: PipelineStep, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(self.abort(step, Error::Cancelled.in_step(step)));
        }

        self.emit_event(Event::StepStarted { step });
        info!(%step, "step started");
        let started = Instant::now();

        match work.await {
            Ok(value) => {
                let elapsed = started.elapsed();
                info!(%step, elapsed_ms = elapsed.as_millis(), "step completed");
                self.emit_event(Event::StepCompleted { step, elapsed });
                Ok(value)
            }
            Err(e) => Err(self.abort(step, e.in_step(step))),
        }
    }

    fn unavailable(&self, step: PipelineStep, missing: &str) -> Error {
        self.abort(
            step,
            Error::DependencyUnavailable {
                step,
                missing: missing.to_string(),
            },
        )
    }

    fn abort(&self, step: PipelineStep, error: Error) -> Error {
        error!(%step, error = %error, code = error.error_code(), "provisioning aborted");
        self.emit_event(Event::Aborted {
            step,
            error: error.to_string(),
        });
        error
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}

/// Status source that reports every poll attempt as an event
struct ObservedStatusSource<'a, S: ?Sized> {
    inner: &'a S,
    event_tx: &'a broadcast::Sender<Event>,
    attempts: AtomicU32,
}

impl<'a, S: ?Sized> ObservedStatusSource<'a, S> {
    fn new(inner: &'a S, event_tx: &'a broadcast::Sender<Event>) -> Self {
        Self {
            inner,
            event_tx,
            attempts: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<'a, S> JobStatusSource for ObservedStatusSource<'a, S>
where
    S: JobStatusSource + ?Sized,
{
    async fn job_status(&self, handle: &RemoteJobHandle) -> Result<JobStatus> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.inner.job_status(handle).await;

        let event = match &result {
            Ok(status) => Event::JobPolled {
                process_id: handle.process_id().to_string(),
                attempt,
                status: *status,
            },
            Err(e) => Event::JobPollFailed {
                process_id: handle.process_id().to_string(),
                attempt,
                error: e.to_string(),
            },
        };
        self.event_tx.send(event).ok();

        result
    }
}
