use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use tracing::{info, warn};

use super::error::ProviderError;
use super::{
    Endpoint, ExtensionRequest, GenerationJob, GenerationRequest, ProviderKind, SoraClient,
    VeoClient, VideoProvider,
};
use crate::auth::Credentials;
use crate::config::ClipConfig;
use crate::storage::GcsStore;

/// HTTP client shared by the provider clients.
///
/// `ceiling` bounds any single request; finer per-call budgets are applied by
/// [`TimeoutPolicy`](crate::config::TimeoutPolicy).
pub fn build_http_client(ceiling: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(ceiling)
        .build()?)
}

/// Turn non-2xx responses into [`ProviderError`]s, keeping status and body.
pub(crate) async fn check_response(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(1000);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ProviderError::Http {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

/// Either concrete provider behind one type, so a service can hold both.
pub enum ProviderClient {
    Sora(SoraClient),
    Veo(VeoClient),
}

/// Build a client for every provider the configuration has credentials for.
///
/// Sora needs an API key and Veo a project; a provider missing either is
/// skipped with a warning rather than failing the whole set.
pub fn build_clients(config: &ClipConfig) -> Result<Vec<ProviderClient>, ProviderError> {
    let http = build_http_client(config.timeouts.ceiling())?;
    let mut clients = Vec::new();

    if config.sora.api_key.trim().is_empty() {
        warn!("sora disabled: no OpenAI API key configured");
    } else {
        let credentials = Credentials::fixed(config.sora.api_key.clone());
        let client = match &config.sora.base_url {
            Some(url) => SoraClient::with_base_url(http.clone(), credentials, url.clone()),
            None => SoraClient::new(http.clone(), config.sora.api_key.clone()),
        };
        info!(model = %config.sora.model, "sora client ready");
        clients.push(ProviderClient::Sora(client));
    }

    if config.veo.project.trim().is_empty() {
        warn!("veo disabled: no Google Cloud project configured");
    } else {
        let credentials = Credentials::new(config.veo.auth.clone());
        let client = match &config.veo.base_url {
            Some(url) => VeoClient::with_base_url(
                http.clone(),
                credentials,
                config.veo.project.clone(),
                config.veo.storage_uri.clone(),
                url.clone(),
                GcsStore::new(http.clone()),
            ),
            None => VeoClient::new(
                http.clone(),
                credentials,
                config.veo.project.clone(),
                config.veo.storage_uri.clone(),
            ),
        };
        info!(project = %config.veo.project, model = %config.veo.model, "veo client ready");
        clients.push(ProviderClient::Veo(client));
    }

    Ok(clients)
}

impl VideoProvider for ProviderClient {
    fn kind(&self) -> ProviderKind {
        match self {
            ProviderClient::Sora(c) => c.kind(),
            ProviderClient::Veo(c) => c.kind(),
        }
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> Result<GenerationJob, ProviderError> {
        match self {
            ProviderClient::Sora(c) => c.submit(endpoint, request).await,
            ProviderClient::Veo(c) => c.submit(endpoint, request).await,
        }
    }

    async fn poll(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<GenerationJob, ProviderError> {
        match self {
            ProviderClient::Sora(c) => c.poll(endpoint, handle).await,
            ProviderClient::Veo(c) => c.poll(endpoint, handle).await,
        }
    }

    async fn fetch_bytes(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        match self {
            ProviderClient::Sora(c) => c.fetch_bytes(endpoint, handle).await,
            ProviderClient::Veo(c) => c.fetch_bytes(endpoint, handle).await,
        }
    }

    async fn extend(
        &self,
        endpoint: &Endpoint,
        source_handle: &str,
        request: &ExtensionRequest,
    ) -> Result<GenerationJob, ProviderError> {
        match self {
            ProviderClient::Sora(c) => c.extend(endpoint, source_handle, request).await,
            ProviderClient::Veo(c) => c.extend(endpoint, source_handle, request).await,
        }
    }

    fn fallback_auth(&self) -> bool {
        match self {
            ProviderClient::Sora(c) => c.fallback_auth(),
            ProviderClient::Veo(c) => c.fallback_auth(),
        }
    }
}
