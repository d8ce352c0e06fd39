//! Translation service client
//!
//! The provisioning workflow talks to the remote service through three traits:
//!
//! - [`JobStatusSource`] answers "what state is this background process in?" and is
//!   all the poller needs.
//! - [`ArchiveLocator`] turns a download request into a fetchable bundle reference.
//! - [`TranslationService`] adds the remaining one-shot operations (projects,
//!   contributors, uploads, keys, tasks) used by the pipeline.
//!
//! [`HttpServiceClient`] implements all three over the service's REST API. Tests
//! substitute their own implementations.

mod http;

pub use http::HttpServiceClient;

use crate::error::Result;
use crate::types::{
    ArchiveReference, Contributor, ContributorSpec, DownloadSpec, JobStatus, KeyId, Project,
    ProjectSpec, RemoteJobHandle, SourceFile, Task, TaskSpec,
};
use async_trait::async_trait;

/// Reports the current status of a background job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// Query the job's status once
    ///
    /// Transport failures are returned as errors; the caller decides whether to retry.
    async fn job_status(&self, handle: &RemoteJobHandle) -> Result<JobStatus>;
}

/// Produces bundle references for finished exports
#[async_trait]
pub trait ArchiveLocator: Send + Sync {
    /// Ask the service to build a bundle matching `spec` and return where to fetch it
    async fn request_download(
        &self,
        project_id: &str,
        spec: &DownloadSpec,
    ) -> Result<ArchiveReference>;
}

/// The remaining remote operations of the provisioning workflow
///
/// None of these are idempotent on the service side: calling `create_project` twice
/// creates two projects.
#[async_trait]
pub trait TranslationService: JobStatusSource + ArchiveLocator {
    /// Create a project
    async fn create_project(&self, spec: &ProjectSpec) -> Result<Project>;

    /// Invite contributors to a project
    async fn create_contributors(
        &self,
        project_id: &str,
        specs: &[ContributorSpec],
    ) -> Result<Vec<Contributor>>;

    /// Upload a source-language file; processing continues in the background
    async fn upload_file(&self, project_id: &str, file: &SourceFile) -> Result<RemoteJobHandle>;

    /// List every key id in a project
    async fn list_keys(&self, project_id: &str) -> Result<Vec<KeyId>>;

    /// Create a translation task
    async fn create_task(&self, project_id: &str, spec: &TaskSpec) -> Result<Task>;
}
