use reqwest::Client;
use tracing::debug;

use super::client::check_response;
use super::error::ProviderError;
use super::types::{SoraCreateRequest, SoraVideo};
use super::{
    Endpoint, ExtensionRequest, GenerationJob, GenerationRequest, JobStatus, MediaRef,
    ProviderKind, Resolution, VideoProvider,
};
use crate::auth::Credentials;

const API_URL: &str = "https://api.openai.com/v1";

/// The only "region" the OpenAI API has.
pub const SORA_REGION: &str = "global";

/// Client for the OpenAI video generation API.
pub struct SoraClient {
    credentials: Credentials,
    client: Client,
    base_url: String,
}

impl SoraClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, Credentials::fixed(api_key), API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(client: Client, credentials: Credentials, base_url: String) -> Self {
        Self {
            credentials,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn size_for(resolution: Resolution) -> &'static str {
        match resolution {
            Resolution::Landscape720 => "1280x720",
            Resolution::Portrait720 => "720x1280",
            Resolution::Landscape1080 => "1792x1024",
            Resolution::Portrait1080 => "1024x1792",
        }
    }

    fn to_job(&self, endpoint: &Endpoint, video: SoraVideo) -> GenerationJob {
        let duration = video.seconds.as_deref().and_then(|s| s.parse::<u32>().ok());
        let progress = video.progress.unwrap_or(0);
        let job = match video.status.as_str() {
            "queued" | "pending" => GenerationJob::pending(
                video.id,
                ProviderKind::Sora,
                endpoint.clone(),
                JobStatus::Queued,
                progress,
            ),
            "completed" | "succeeded" => GenerationJob::completed(
                video.id,
                ProviderKind::Sora,
                endpoint.clone(),
                Some(MediaRef::ProviderContent),
            ),
            "failed" | "cancelled" => {
                let message = video
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("video generation {}", video.status));
                GenerationJob::failed(video.id, ProviderKind::Sora, endpoint.clone(), message)
            }
            _ => GenerationJob::pending(
                video.id,
                ProviderKind::Sora,
                endpoint.clone(),
                JobStatus::InProgress,
                progress,
            ),
        };
        match duration {
            Some(seconds) => job.with_duration(seconds),
            None => job,
        }
    }
}

impl VideoProvider for SoraClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sora
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> Result<GenerationJob, ProviderError> {
        let body = SoraCreateRequest {
            model: endpoint.model.clone(),
            prompt: request.prompt.clone(),
            seconds: request.duration_sec.to_string(),
            size: Self::size_for(request.resolution).to_string(),
        };
        let token = self.credentials.token().await?;
        let response = self
            .client
            .post(format!("{}/videos", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let video = check_response(response).await?.json::<SoraVideo>().await?;
        debug!(handle = %video.id, model = %endpoint.model, "sora job created");
        Ok(self.to_job(endpoint, video).with_duration(request.duration_sec))
    }

    async fn poll(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<GenerationJob, ProviderError> {
        let token = self.credentials.token().await?;
        let response = self
            .client
            .get(format!("{}/videos/{handle}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        let video = check_response(response).await?.json::<SoraVideo>().await?;
        Ok(self.to_job(endpoint, video))
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
        let token = self.credentials.token().await?;
        let response = self
            .client
            .get(format!("{}/videos/{handle}/content", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(check_response(response).await?.bytes().await?.to_vec())
    }

    async fn extend(
        &self,
        _endpoint: &Endpoint,
        _source_handle: &str,
        _request: &ExtensionRequest,
    ) -> Result<GenerationJob, ProviderError> {
        Err(ProviderError::Unsupported("sora clips cannot be extended"))
    }

    fn fallback_auth(&self) -> bool {
        self.credentials.fallback()
    }
}
