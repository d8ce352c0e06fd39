//! Core types for tms-provision

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Identifies one asynchronous server-side job (a queued process) and the project it belongs to
///
/// Created by the upload step and consumed by the poller. The handle never changes once
/// created; the poller owns it until it returns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteJobHandle {
    process_id: String,
    project_id: String,
}

impl RemoteJobHandle {
    /// Create a new handle from a process id and its owning project id
    pub fn new(process_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            project_id: project_id.into(),
        }
    }

    /// The opaque process id assigned by the service
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// The project the process runs in
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl std::fmt::Display for RemoteJobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.process_id)
    }
}

/// Status of a background job as reported by the service
///
/// Only `Finished` and `Failed` are terminal. Any status string the crate does not
/// recognize maps to `Unknown`, which is treated as still pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// Accepted but not started
    Queued,
    /// Being worked on (covers the service's pre/post-processing phases too)
    Processing,
    /// Completed successfully
    Finished,
    /// Completed with an error
    Failed,
    /// Any status string not listed above
    Unknown,
}

impl JobStatus {
    /// Map a raw status string from the service to a status
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => JobStatus::Queued,
            "processing" | "pre_processing" | "running" | "post_processing" => {
                JobStatus::Processing
            }
            "finished" => JobStatus::Finished,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        JobStatus::from_remote(&raw)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive formats a bundle can arrive in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// ZIP archive (the only format bundles are produced in)
    Zip,
}

/// Fetchable reference to a translation bundle
///
/// Produced by the download request and consumed exactly once by the fetcher,
/// which is why it is neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct ArchiveReference {
    /// Location of the bundle
    pub url: String,
    /// Expected archive format
    pub expected_content_type: ArchiveFormat,
}

impl ArchiveReference {
    /// Reference to a ZIP bundle at `url`
    pub fn zip(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_content_type: ArchiveFormat::Zip,
        }
    }
}

/// Where and how a bundle gets unpacked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionTarget {
    /// Destination directory; created if it does not exist
    pub directory: PathBuf,
    /// Replace existing files (last write wins). When false an existing file fails extraction.
    pub overwrite: bool,
    /// Restrict extraction to these entry names (None = every entry)
    pub entries: Option<Vec<String>>,
}

impl ExtractionTarget {
    /// Extract every entry into `directory`, replacing existing files
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            overwrite: true,
            entries: None,
        }
    }

    /// Set the overwrite policy
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Only extract the named entries
    pub fn only<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries = Some(entries.into_iter().map(Into::into).collect());
        self
    }
}

/// A language to enable in a new project
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Language code
    pub lang_iso: String,
}

impl LanguageSpec {
    /// Language with the given code
    pub fn new(lang_iso: impl Into<String>) -> Self {
        Self {
            lang_iso: lang_iso.into(),
        }
    }
}

/// Parameters for creating a project
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Project name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Languages to enable
    pub languages: Vec<LanguageSpec>,
    /// Base (source) language code
    pub base_lang_iso: String,
}

/// A project as returned by the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque project id
    pub project_id: String,
    /// Project name
    pub name: String,
    /// Project description
    #[serde(default)]
    pub description: String,
}

/// Per-language permission for a contributor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorLanguage {
    /// Language code
    pub lang_iso: String,
    /// Whether the contributor may edit this language
    pub is_writable: bool,
}

/// Parameters for inviting a contributor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorSpec {
    /// Invitation e-mail address
    pub email: String,
    /// Display name
    pub fullname: String,
    /// Project admin rights
    #[serde(default)]
    pub is_admin: bool,
    /// Reviewer rights
    #[serde(default)]
    pub is_reviewer: bool,
    /// Language permissions
    pub languages: Vec<ContributorLanguage>,
}

/// An invited contributor as returned by the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// User id, needed for task assignment
    pub user_id: u64,
    /// E-mail address
    pub email: String,
    /// Display name
    #[serde(default)]
    pub fullname: String,
}

/// Translation key id
pub type KeyId = u64;

/// A source-language file to upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Filename reported to the service (e.g. "en.json")
    pub filename: String,
    /// Language of the file's contents
    pub lang_iso: String,
    /// Raw file bytes
    pub content: Vec<u8>,
}

impl SourceFile {
    /// Build a source file from in-memory contents
    pub fn new(
        filename: impl Into<String>,
        lang_iso: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            lang_iso: lang_iso.into(),
            content: content.into(),
        }
    }

    /// Read a source file from disk, naming it after the file's own name
    pub async fn read(path: &Path, lang_iso: impl Into<String>) -> Result<Self> {
        let content = tokio::fs::read(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read source file '{}': {}", path.display(), e),
            ))
        })?;

        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config {
                message: format!("source file path has no file name: {}", path.display()),
                key: Some("source_file".to_string()),
            })?
            .to_string();

        Ok(Self {
            filename,
            lang_iso: lang_iso.into(),
            content,
        })
    }
}

/// Assignees for one language of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLanguageSpec {
    /// Language code
    pub language_iso: String,
    /// User ids to assign
    pub users: Vec<u64>,
}

/// Parameters for creating a translation task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task title
    pub title: String,
    /// Keys covered by the task
    pub keys: Vec<KeyId>,
    /// Languages and their assignees
    pub languages: Vec<TaskLanguageSpec>,
}

/// A created task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub task_id: u64,
    /// Task title
    pub title: String,
    /// Language codes the task covers
    pub languages: Vec<String>,
}

/// Filter describing which bundle the service should build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSpec {
    /// File format (e.g. "json")
    pub format: String,
    /// Languages to include
    pub filter_langs: Vec<String>,
    /// Keep the uploaded filenames in the bundle
    pub original_filenames: bool,
    /// Directory prefix inside the bundle
    pub directory_prefix: String,
    /// Indentation style (e.g. "2sp")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indentation: Option<String>,
}

impl DownloadSpec {
    /// JSON bundle for the given languages, flat layout with original filenames
    pub fn json(filter_langs: Vec<String>) -> Self {
        Self {
            format: "json".to_string(),
            filter_langs,
            original_filenames: true,
            directory_prefix: String::new(),
            indentation: None,
        }
    }
}

/// Pipeline steps, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Create the project
    CreateProject,
    /// Invite contributors
    InviteContributors,
    /// Upload the source-language file
    UploadFile,
    /// Wait for the upload's background process
    AwaitProcessing,
    /// List the keys the upload created
    ListKeys,
    /// Assign a translation task
    CreateTask,
    /// Ask the service to build a bundle
    RequestDownload,
    /// Retrieve the bundle bytes
    FetchBundle,
    /// Unpack the bundle locally
    ExtractBundle,
}

impl PipelineStep {
    /// Every step in execution order
    pub const ALL: [PipelineStep; 9] = [
        PipelineStep::CreateProject,
        PipelineStep::InviteContributors,
        PipelineStep::UploadFile,
        PipelineStep::AwaitProcessing,
        PipelineStep::ListKeys,
        PipelineStep::CreateTask,
        PipelineStep::RequestDownload,
        PipelineStep::FetchBundle,
        PipelineStep::ExtractBundle,
    ];

    /// Snake-case step name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::CreateProject => "create_project",
            PipelineStep::InviteContributors => "invite_contributors",
            PipelineStep::UploadFile => "upload_file",
            PipelineStep::AwaitProcessing => "await_processing",
            PipelineStep::ListKeys => "list_keys",
            PipelineStep::CreateTask => "create_task",
            PipelineStep::RequestDownload => "request_download",
            PipelineStep::FetchBundle => "fetch_bundle",
            PipelineStep::ExtractBundle => "extract_bundle",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted by the pipeline
///
/// Subscribe via [`crate::ProvisioningPipeline::subscribe`]. Events are informational;
/// a lagging or absent subscriber never affects the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A step began
    StepStarted {
        /// The step
        step: PipelineStep,
    },

    /// A step finished successfully
    StepCompleted {
        /// The step
        step: PipelineStep,
        /// How long it took
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },

    /// The poller received a status for the upload process
    JobPolled {
        /// Process being polled
        process_id: String,
        /// 1-based attempt number
        attempt: u32,
        /// Status reported on this attempt
        status: JobStatus,
    },

    /// A status query failed and counted as a spent attempt
    JobPollFailed {
        /// Process being polled
        process_id: String,
        /// 1-based attempt number
        attempt: u32,
        /// Error message
        error: String,
    },

    /// A step failed and the pipeline aborted
    Aborted {
        /// The failing step
        step: PipelineStep,
        /// Error message
        error: String,
    },
}

/// Summary of a completed pipeline run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Created project
    pub project: Project,
    /// Contributor the task was assigned to
    pub contributor: Contributor,
    /// Upload process id
    pub process_id: String,
    /// Status queries spent waiting for the upload
    pub poll_attempts: u32,
    /// Key ids found after processing
    pub key_ids: Vec<KeyId>,
    /// Created task
    pub task: Task,
    /// Bundle URL that was fetched
    pub bundle_url: String,
    /// Files written by extraction
    pub extracted_files: Vec<PathBuf>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
