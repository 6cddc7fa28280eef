use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::client::check_response;
use super::error::ProviderError;
use super::types::{
    VeoFetchRequest, VeoInstance, VeoOperation, VeoOperationName, VeoParameters,
    VeoPredictRequest, VeoVideo,
};
use super::{
    Endpoint, ExtensionRequest, GenerationJob, GenerationRequest, JobStatus, MediaRef,
    ProviderKind, Resolution, VideoProvider,
};
use crate::auth::Credentials;
use crate::storage::GcsStore;

/// `{region}` is replaced with the endpoint's region.
const API_URL_TEMPLATE: &str = "https://{region}-aiplatform.googleapis.com";

const VIDEO_MIME: &str = "video/mp4";

/// Client for Veo long-running operations on Vertex AI.
pub struct VeoClient {
    credentials: Credentials,
    client: Client,
    project: String,
    storage_uri: Option<String>,
    base_url: String,
    store: GcsStore,
}

impl VeoClient {
    pub fn new(
        client: Client,
        credentials: Credentials,
        project: String,
        storage_uri: Option<String>,
    ) -> Self {
        let store = GcsStore::new(client.clone());
        Self::with_base_url(
            client,
            credentials,
            project,
            storage_uri,
            API_URL_TEMPLATE.to_string(),
            store,
        )
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    /// The URL may contain a `{region}` placeholder.
    pub fn with_base_url(
        client: Client,
        credentials: Credentials,
        project: String,
        storage_uri: Option<String>,
        base_url: String,
        store: GcsStore,
    ) -> Self {
        Self {
            credentials,
            client,
            project,
            storage_uri,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    fn model_url(&self, endpoint: &Endpoint, verb: &str) -> String {
        let base = self.base_url.replace("{region}", &endpoint.region);
        format!(
            "{base}/v1/projects/{}/locations/{}/publishers/google/models/{}:{verb}",
            self.project, endpoint.region, endpoint.model
        )
    }

    fn parameters(&self, seconds: u32, resolution: Resolution) -> VeoParameters {
        let (aspect_ratio, height) = match resolution {
            Resolution::Landscape720 => ("16:9", "720p"),
            Resolution::Portrait720 => ("9:16", "720p"),
            Resolution::Landscape1080 => ("16:9", "1080p"),
            Resolution::Portrait1080 => ("9:16", "1080p"),
        };
        VeoParameters {
            duration_seconds: seconds,
            sample_count: 1,
            aspect_ratio: aspect_ratio.to_string(),
            resolution: height.to_string(),
            storage_uri: self.storage_uri.clone(),
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        url: String,
        body: &B,
    ) -> Result<reqwest::Response, ProviderError> {
        let token = self.credentials.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_response(response).await
    }

    async fn predict(
        &self,
        endpoint: &Endpoint,
        body: &VeoPredictRequest,
    ) -> Result<String, ProviderError> {
        let url = self.model_url(endpoint, "predictLongRunning");
        let op = self
            .post_json(url, body)
            .await?
            .json::<VeoOperationName>()
            .await?;
        if op.name.is_empty() {
            return Err(ProviderError::Parse("operation name missing".into()));
        }
        Ok(op.name)
    }

    async fn fetch_operation(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<VeoOperation, ProviderError> {
        let url = self.model_url(endpoint, "fetchPredictOperation");
        let body = VeoFetchRequest {
            operation_name: handle.to_string(),
        };
        Ok(self.post_json(url, &body).await?.json::<VeoOperation>().await?)
    }

    fn media_of(video: &VeoVideo) -> Option<MediaRef> {
        let mime_type = video.mime_type.clone().unwrap_or_else(|| VIDEO_MIME.to_string());
        if let Some(uri) = video.gcs_uri.as_ref().filter(|u| !u.is_empty()) {
            return Some(MediaRef::Storage {
                uri: uri.clone(),
                mime_type,
            });
        }
        video
            .bytes_base64_encoded
            .as_ref()
            .filter(|b| !b.is_empty())
            .map(|b| MediaRef::Inline {
                base64: b.clone(),
                mime_type,
            })
    }

    fn to_job(endpoint: &Endpoint, handle: &str, op: VeoOperation) -> GenerationJob {
        if let Some(error) = op.error {
            let message = if error.message.is_empty() {
                format!("operation failed with code {}", error.code)
            } else {
                error.message
            };
            return GenerationJob::failed(handle, ProviderKind::Veo, endpoint.clone(), message);
        }

        if !op.done {
            return GenerationJob::pending(
                handle,
                ProviderKind::Veo,
                endpoint.clone(),
                JobStatus::InProgress,
                0,
            );
        }

        let response = op.response.unwrap_or_default();
        if let Some(media) = response.videos.iter().find_map(Self::media_of) {
            let endpoint = endpoint.clone();
            return GenerationJob::completed(handle, ProviderKind::Veo, endpoint, Some(media));
        }

        match response.rai_media_filtered_count {
            Some(count) if count > 0 => {
                let reasons = if response.rai_media_filtered_reasons.is_empty() {
                    "no reason given".to_string()
                } else {
                    response.rai_media_filtered_reasons.join("; ")
                };
                GenerationJob::failed(
                    handle,
                    ProviderKind::Veo,
                    endpoint.clone(),
                    format!("video removed by content safety filters: {reasons}"),
                )
            }
            _ => GenerationJob::completed(handle, ProviderKind::Veo, endpoint.clone(), None),
        }
    }
}

impl VideoProvider for VeoClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Veo
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> Result<GenerationJob, ProviderError> {
        let body = VeoPredictRequest {
            instances: vec![VeoInstance {
                prompt: request.prompt.clone(),
                video: None,
            }],
            parameters: self.parameters(request.duration_sec, request.resolution),
        };
        let name = self.predict(endpoint, &body).await?;
        debug!(handle = %name, endpoint = %endpoint, "veo operation created");
        Ok(GenerationJob::pending(
            name,
            ProviderKind::Veo,
            endpoint.clone(),
            JobStatus::Queued,
            0,
        )
        .with_duration(request.duration_sec))
    }

    async fn poll(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<GenerationJob, ProviderError> {
        let op = self.fetch_operation(endpoint, handle).await?;
        Ok(Self::to_job(endpoint, handle, op))
    }

    async fn fetch_bytes(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let job = self.poll(endpoint, handle).await?;
        if !job.is_completed() {
            return Err(ProviderError::NotReady {
                handle: handle.to_string(),
                status: job.status,
            });
        }
        match job.media {
            Some(MediaRef::Inline { base64, .. }) => BASE64
                .decode(base64.as_bytes())
                .map_err(|e| ProviderError::Parse(format!("invalid inline video payload: {e}"))),
            Some(MediaRef::Storage { uri, .. }) => {
                let token = self.credentials.token().await?;
                self.store.download(&uri, &token).await
            }
            Some(MediaRef::ProviderContent) | None => Err(ProviderError::Parse(
                "completed operation has no downloadable video".into(),
            )),
        }
    }

    async fn extend(
        &self,
        endpoint: &Endpoint,
        source_handle: &str,
        request: &ExtensionRequest,
    ) -> Result<GenerationJob, ProviderError> {
        let source = self.poll(endpoint, source_handle).await?;
        let video = match (&source.status, &source.media) {
            (JobStatus::Completed, Some(MediaRef::Storage { uri, mime_type })) => VeoVideo {
                gcs_uri: Some(uri.clone()),
                bytes_base64_encoded: None,
                mime_type: Some(mime_type.clone()),
            },
            (JobStatus::Completed, Some(MediaRef::Inline { base64, mime_type })) => VeoVideo {
                gcs_uri: None,
                bytes_base64_encoded: Some(base64.clone()),
                mime_type: Some(mime_type.clone()),
            },
            (status, _) => {
                return Err(ProviderError::NotReady {
                    handle: source_handle.to_string(),
                    status: *status,
                });
            }
        };

        let body = VeoPredictRequest {
            instances: vec![VeoInstance {
                prompt: request.prompt.clone(),
                video: Some(video),
            }],
            parameters: self.parameters(request.increment_sec, request.resolution),
        };
        let name = self.predict(endpoint, &body).await?;
        debug!(handle = %name, source = %source_handle, "veo extension created");
        Ok(GenerationJob::pending(
            name,
            ProviderKind::Veo,
            endpoint.clone(),
            JobStatus::Queued,
            0,
        )
        .with_duration(request.increment_sec))
    }

    fn fallback_auth(&self) -> bool {
        self.credentials.fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PREDICT: &str = concat!(
        "/v1/projects/proj/locations/us-central1/publishers/google/models/veo-3.1",
        ":predictLongRunning"
    );
    const FETCH: &str = concat!(
        "/v1/projects/proj/locations/us-central1/publishers/google/models/veo-3.1",
        ":fetchPredictOperation"
    );

    fn endpoint() -> Endpoint {
        Endpoint::new("veo-3.1", "us-central1")
    }

    fn client_for(server: &MockServer, storage_uri: Option<&str>) -> VeoClient {
        let http = Client::new();
        VeoClient::with_base_url(
            http.clone(),
            Credentials::fixed("tok"),
            "proj".into(),
            storage_uri.map(str::to_string),
            server.uri(),
            GcsStore::with_base_url(http, server.uri()),
        )
    }

    async fn mount_operation(server: &MockServer, name: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(FETCH))
            .and(body_partial_json(json!({ "operationName": name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn region_placeholder_is_substituted() {
        let client = VeoClient::new(Client::new(), Credentials::fixed("t"), "proj".into(), None);
        let endpoint = Endpoint::new("veo-3.0-generate-001", "europe-west4");
        let url = client.model_url(&endpoint, "predictLongRunning");
        assert_eq!(
            url,
            concat!(
                "https://europe-west4-aiplatform.googleapis.com/v1/projects/proj/",
                "locations/europe-west4/publishers/google/models/",
                "veo-3.0-generate-001:predictLongRunning"
            )
        );
    }

    #[tokio::test]
    async fn submit_posts_prompt_and_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "instances": [{"prompt": "a fox in snow"}],
                "parameters": {
                    "durationSeconds": 8,
                    "aspectRatio": "16:9",
                    "resolution": "720p",
                    "storageUri": "gs://out/"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ops/base"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest {
            prompt: "a fox in snow".into(),
            duration_sec: 8,
            resolution: Resolution::Landscape720,
        };
        let job = client_for(&server, Some("gs://out/"))
            .submit(&endpoint(), &request)
            .await
            .unwrap();
        assert_eq!(job.handle, "ops/base");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.endpoint, endpoint());
    }

    #[tokio::test]
    async fn poll_maps_operation_states() {
        let server = MockServer::start().await;
        let running = json!({"name": "ops/running", "done": false});
        mount_operation(&server, "ops/running", running).await;
        mount_operation(
            &server,
            "ops/done",
            json!({"name": "ops/done", "done": true,
                   "response": {"videos": [{"gcsUri": "gs://out/a.mp4", "mimeType": "video/mp4"}]}}),
        )
        .await;
        mount_operation(
            &server,
            "ops/error",
            json!({"name": "ops/error", "done": true,
                   "error": {"code": 3, "message": "bad prompt"}}),
        )
        .await;
        mount_operation(
            &server,
            "ops/filtered",
            json!({"name": "ops/filtered", "done": true,
                   "response": {"raiMediaFilteredCount": 1, "raiMediaFilteredReasons": ["violence"]}}),
        )
        .await;
        mount_operation(
            &server,
            "ops/empty",
            json!({"name": "ops/empty", "done": true, "response": {"videos": []}}),
        )
        .await;

        let client = client_for(&server, None);
        let running = client.poll(&endpoint(), "ops/running").await.unwrap();
        assert_eq!(running.status, JobStatus::InProgress);

        let done = client.poll(&endpoint(), "ops/done").await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(
            done.media,
            Some(MediaRef::Storage {
                uri: "gs://out/a.mp4".into(),
                mime_type: "video/mp4".into()
            })
        );

        let error = client.poll(&endpoint(), "ops/error").await.unwrap();
        assert_eq!(error.status, JobStatus::Failed);
        assert_eq!(error.error_message.as_deref(), Some("bad prompt"));

        let filtered = client.poll(&endpoint(), "ops/filtered").await.unwrap();
        assert_eq!(filtered.status, JobStatus::Failed);
        assert!(filtered.error_message.unwrap().contains("violence"));

        let empty = client.poll(&endpoint(), "ops/empty").await.unwrap();
        assert_eq!(empty.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn fetch_bytes_decodes_inline_video() {
        let server = MockServer::start().await;
        mount_operation(
            &server,
            "ops/inline",
            json!({"name": "ops/inline", "done": true,
                   "response": {"videos": [{"bytesBase64Encoded": BASE64.encode(b"frames")}]}}),
        )
        .await;

        let bytes = client_for(&server, None)
            .fetch_bytes(&endpoint(), "ops/inline")
            .await
            .unwrap();
        assert_eq!(bytes, b"frames");
    }

    #[tokio::test]
    async fn fetch_bytes_downloads_from_storage() {
        let server = MockServer::start().await;
        mount_operation(
            &server,
            "ops/stored",
            json!({"name": "ops/stored", "done": true,
                   "response": {"videos": [{"gcsUri": "gs://out/final.mp4"}]}}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/out/o/final.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"stored".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client_for(&server, None)
            .fetch_bytes(&endpoint(), "ops/stored")
            .await
            .unwrap();
        assert_eq!(bytes, b"stored");
    }

    #[tokio::test]
    async fn fetch_bytes_on_running_operation_is_not_ready() {
        let server = MockServer::start().await;
        mount_operation(&server, "ops/running", json!({"name": "ops/running"})).await;

        let err = client_for(&server, None)
            .fetch_bytes(&endpoint(), "ops/running")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::NotReady { status: JobStatus::InProgress, .. }
        ));
    }

    #[tokio::test]
    async fn extend_references_source_video() {
        let server = MockServer::start().await;
        mount_operation(
            &server,
            "ops/base",
            json!({"name": "ops/base", "done": true,
                   "response": {"videos": [{"gcsUri": "gs://out/base.mp4", "mimeType": "video/mp4"}]}}),
        )
        .await;
        Mock::given(method("POST"))
            .and(path(PREDICT))
            .and(body_partial_json(json!({
                "instances": [{"prompt": "keep going", "video": {"gcsUri": "gs://out/base.mp4"}}],
                "parameters": {"durationSeconds": 7, "resolution": "720p"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ops/ext-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ExtensionRequest {
            prompt: "keep going".into(),
            increment_sec: 7,
            resolution: Resolution::Landscape720,
        };
        let job = client_for(&server, Some("gs://out/"))
            .extend(&endpoint(), "ops/base", &request)
            .await
            .unwrap();
        assert_eq!(job.handle, "ops/ext-1");
        assert_eq!(job.duration_sec, Some(7));
    }

    #[tokio::test]
    async fn extend_requires_completed_source() {
        let server = MockServer::start().await;
        mount_operation(&server, "ops/base", json!({"name": "ops/base", "done": false})).await;
        Mock::given(method("POST"))
            .and(path(PREDICT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ops/x"})))
            .expect(0)
            .mount(&server)
            .await;

        let request = ExtensionRequest {
            prompt: "p".into(),
            increment_sec: 7,
            resolution: Resolution::Landscape720,
        };
        let err = client_for(&server, None)
            .extend(&endpoint(), "ops/base", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotReady { .. }));
    }

    #[tokio::test]
    async fn storage_prerequisite_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":{"message":"storageUri must be specified"}}"#),
            )
            .mount(&server)
            .await;

        let request = GenerationRequest {
            prompt: "p".into(),
            duration_sec: 8,
            resolution: Resolution::Landscape720,
        };
        let err = client_for(&server, None)
            .submit(&endpoint(), &request)
            .await
            .unwrap_err();
        assert!(err.is_storage_prerequisite());
    }
}
