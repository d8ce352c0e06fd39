use super::{ArchiveLocator, JobStatusSource, TranslationService};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::types::{
    ArchiveReference, Contributor, ContributorSpec, DownloadSpec, JobStatus, KeyId, Project,
    ProjectSpec, RemoteJobHandle, SourceFile, Task, TaskSpec,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

const API_TOKEN_HEADER: &str = "x-api-token";
const PAGE_COUNT_HEADER: &str = "x-pagination-page-count";

/// REST client for the translation service API
///
/// Every request carries the `X-Api-Token` header and the configured timeout.
/// Non-success responses become [`Error::Api`] with the message from the service's
/// `{"error": {"message": ...}}` body; connection failures become [`Error::Transport`].
pub struct HttpServiceClient {
    http: reqwest::Client,
    base_url: Url,
    keys_page_limit: u32,
}

impl HttpServiceClient {
    /// Build a client from validated service settings
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url '{}': {}", config.base_url, e),
            key: Some("service.base_url".to_string()),
        })?;

        let mut token = HeaderValue::from_str(&config.api_token).map_err(|_| Error::Config {
            message: "api_token contains characters not allowed in a header".to_string(),
            key: Some("service.api_token".to_string()),
        })?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .user_agent(concat!("tms-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::TransportMessage(format!("failed to create HTTP client: {}", e)))?;

        tracing::debug!(base_url = %base_url, "service client initialised");

        Ok(Self {
            http,
            base_url,
            keys_page_limit: config.keys_page_limit,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config {
                message: format!("base_url '{}' cannot be used as a base", self.base_url),
                key: Some("service.base_url".to_string()),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode a JSON body, returning the response headers too
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<(T, HeaderMap)> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "service request failed");
            Error::Transport(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = api_error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string()
            });
            tracing::warn!(operation, status = status.as_u16(), %message, "service returned an error");
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value = serde_json::from_slice(&body)?;
        Ok((value, headers))
    }
}

#[async_trait]
impl JobStatusSource for HttpServiceClient {
    async fn job_status(&self, handle: &RemoteJobHandle) -> Result<JobStatus> {
        let url = self.endpoint(&[
            "projects",
            handle.project_id(),
            "processes",
            handle.process_id(),
        ])?;
        let (response, _): (ProcessEnvelope, _) =
            self.send(self.http.get(url), "get_process").await?;

        tracing::debug!(
            process_id = handle.process_id(),
            status = %response.process.status,
            "fetched process status"
        );
        Ok(response.process.status)
    }
}

#[async_trait]
impl ArchiveLocator for HttpServiceClient {
    async fn request_download(
        &self,
        project_id: &str,
        spec: &DownloadSpec,
    ) -> Result<ArchiveReference> {
        let url = self.endpoint(&["projects", project_id, "files", "download"])?;
        let (response, _): (DownloadEnvelope, _) = self
            .send(self.http.post(url).json(spec), "download_files")
            .await?;

        tracing::info!(project_id, bundle_url = %response.bundle_url, "bundle ready");
        Ok(ArchiveReference::zip(response.bundle_url))
    }
}

#[async_trait]
impl TranslationService for HttpServiceClient {
    async fn create_project(&self, spec: &ProjectSpec) -> Result<Project> {
        let url = self.endpoint(&["projects"])?;
        let (project, _): (Project, _) = self
            .send(self.http.post(url).json(spec), "create_project")
            .await?;

        tracing::info!(project_id = %project.project_id, name = %project.name, "created project");
        Ok(project)
    }

    async fn create_contributors(
        &self,
        project_id: &str,
        specs: &[ContributorSpec],
    ) -> Result<Vec<Contributor>> {
        let url = self.endpoint(&["projects", project_id, "contributors"])?;
        let body = ContributorsRequest {
            contributors: specs,
        };
        let (response, _): (ContributorsEnvelope, _) = self
            .send(self.http.post(url).json(&body), "create_contributors")
            .await?;

        tracing::info!(
            project_id,
            count = response.contributors.len(),
            "invited contributors"
        );
        Ok(response.contributors)
    }

    async fn upload_file(&self, project_id: &str, file: &SourceFile) -> Result<RemoteJobHandle> {
        let url = self.endpoint(&["projects", project_id, "files", "upload"])?;
        let body = UploadRequest {
            data: base64::engine::general_purpose::STANDARD.encode(&file.content),
            filename: &file.filename,
            lang_iso: &file.lang_iso,
        };
        let (response, _): (ProcessEnvelope, _) = self
            .send(self.http.post(url).json(&body), "upload_file")
            .await?;

        tracing::info!(
            project_id,
            filename = %file.filename,
            process_id = %response.process.process_id,
            status = %response.process.status,
            "queued upload"
        );
        Ok(RemoteJobHandle::new(response.process.process_id, project_id))
    }

    async fn list_keys(&self, project_id: &str) -> Result<Vec<KeyId>> {
        let mut key_ids = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = self.endpoint(&["projects", project_id, "keys"])?;
            let request = self
                .http
                .get(url)
                .query(&[("limit", self.keys_page_limit), ("page", page)]);
            let (response, headers): (KeysEnvelope, _) = self.send(request, "list_keys").await?;

            let fetched = response.keys.len();
            key_ids.extend(response.keys.into_iter().map(|k| k.key_id));

            let page_count = headers
                .get(PAGE_COUNT_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());

            match page_count {
                Some(count) if page < count && fetched > 0 => page += 1,
                _ => break,
            }
        }

        tracing::info!(project_id, count = key_ids.len(), "listed keys");
        Ok(key_ids)
    }

    async fn create_task(&self, project_id: &str, spec: &TaskSpec) -> Result<Task> {
        let url = self.endpoint(&["projects", project_id, "tasks"])?;
        let (response, _): (TaskEnvelope, _) = self
            .send(self.http.post(url).json(spec), "create_task")
            .await?;

        let task = Task {
            task_id: response.task.task_id,
            title: response.task.title,
            languages: response
                .task
                .languages
                .into_iter()
                .map(|l| l.language_iso)
                .collect(),
        };
        tracing::info!(project_id, task_id = task.task_id, title = %task.title, "created task");
        Ok(task)
    }
}

/// Pull the message out of an error body, if it has one
fn api_error_message(body: &[u8]) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
    envelope
        .error
        .map(|e| e.message)
        .or(envelope.message)
        .filter(|m| !m.is_empty())
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct ContributorsRequest<'a> {
    contributors: &'a [ContributorSpec],
}

#[derive(Deserialize)]
struct ContributorsEnvelope {
    contributors: Vec<Contributor>,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    data: String,
    filename: &'a str,
    lang_iso: &'a str,
}

#[derive(Deserialize)]
struct ProcessEnvelope {
    process: ProcessBody,
}

#[derive(Deserialize)]
struct ProcessBody {
    process_id: String,
    status: JobStatus,
}

#[derive(Deserialize)]
struct DownloadEnvelope {
    bundle_url: String,
}

#[derive(Deserialize)]
struct KeysEnvelope {
    #[serde(default)]
    keys: Vec<KeyBody>,
}

#[derive(Deserialize)]
struct KeyBody {
    key_id: KeyId,
}

#[derive(Deserialize)]
struct TaskEnvelope {
    task: TaskBody,
}

#[derive(Deserialize)]
struct TaskBody {
    task_id: u64,
    title: String,
    #[serde(default)]
    languages: Vec<TaskLanguageBody>,
}

#[derive(Deserialize)]
struct TaskLanguageBody {
    language_iso: String,
}
