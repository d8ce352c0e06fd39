//! Shared fixtures for the integration tests: a wiremock-backed translation service

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::io::{Cursor, Write};
use std::time::Duration;
use tms_provision::types::{ExtractionTarget, SourceFile};
use tms_provision::{
    ArchiveFetcher, FetchConfig, HttpServiceClient, PollingPolicy, ProvisionPlan,
    ProvisioningPipeline, ServiceConfig,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_TOKEN: &str = "integration-token";
pub const PROJECT_ID: &str = "41927157619e6abd190863.11993227";
pub const PROCESS_ID: &str = "ff1876382b7ba81f2bb465da8f030196ec401fa6";
pub const USER_ID: u64 = 20181;
pub const FR_JSON: &[u8] = br#"{"welcome":"Bienvenue dans notre application"}"#;

/// ZIP bundle as the service would produce it for `filter_langs: ["fr"]`
pub fn fr_bundle() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("fr.json", options).unwrap();
    writer.write_all(FR_JSON).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Mount every one-shot endpoint of the provisioning workflow
///
/// The process endpoint answers `queued` for the first `pending_polls` queries and
/// `final_status` afterwards. The bundle lives at `/bundle.zip` on the same server.
pub async fn mount_service(server: &MockServer, pending_polls: u64, final_status: &str) {
    let project = format!("/projects/{PROJECT_ID}");

    Mock::given(method("POST"))
        .and(path("/projects"))
        .and(header("x-api-token", API_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": PROJECT_ID,
            "name": "Rust Sample Project",
            "description": "Here's my Rust project"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{project}/contributors")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": PROJECT_ID,
            "contributors": [{
                "user_id": USER_ID,
                "email": "translator@example.com",
                "fullname": "Mr. Translator"
            }]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{project}/files/upload")))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "project_id": PROJECT_ID,
            "process": {"process_id": PROCESS_ID, "type": "file-import", "status": "queued"}
        })))
        .expect(1)
        .mount(server)
        .await;

    if pending_polls > 0 {
        Mock::given(method("GET"))
            .and(path(format!("{project}/processes/{PROCESS_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "project_id": PROJECT_ID,
                "process": {"process_id": PROCESS_ID, "status": "queued"}
            })))
            .up_to_n_times(pending_polls)
            .with_priority(1)
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(format!("{project}/processes/{PROCESS_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": PROJECT_ID,
            "process": {"process_id": PROCESS_ID, "status": final_status}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{project}/keys")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Pagination-Page-Count", "1")
                .set_body_json(json!({
                    "project_id": PROJECT_ID,
                    "keys": [{"key_id": 101}, {"key_id": 102}, {"key_id": 103}]
                })),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{project}/tasks")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": PROJECT_ID,
            "task": {
                "task_id": 55,
                "title": "Translate French",
                "languages": [{"language_iso": "fr", "users": [{"user_id": USER_ID}]}]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{project}/files/download")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": PROJECT_ID,
            "bundle_url": format!("{}/bundle.zip", server.uri())
        })))
        .mount(server)
        .await;
}

/// Pipeline pointed at the mock server with a fast polling interval
pub fn pipeline_for(server: &MockServer, max_attempts: u32) -> ProvisioningPipeline<HttpServiceClient> {
    let service = ServiceConfig::new(API_TOKEN).with_base_url(server.uri());
    ProvisioningPipeline::new(
        HttpServiceClient::new(service).unwrap(),
        ArchiveFetcher::new(&FetchConfig::default()).unwrap(),
        PollingPolicy::fixed(max_attempts, Duration::from_millis(20)),
    )
}

/// Sample plan uploading a small English file into `target`
pub fn sample_plan(target: &std::path::Path) -> ProvisionPlan {
    ProvisionPlan::sample(
        SourceFile::new("en.json", "en", br#"{"welcome":"Welcome to our app"}"#.to_vec()),
        ExtractionTarget::new(target),
    )
}
