//! Download of finished videos that the provider left in object storage.

use reqwest::{Client, Url};
use tracing::debug;

use crate::provider::ProviderError;

const GCS_API_URL: &str = "https://storage.googleapis.com";

/// Split `gs://bucket/path/to/object` into `(bucket, object)`.
pub fn parse_gs_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("gs://")?;
    let (bucket, object) = rest.split_once('/')?;
    if bucket.is_empty() || object.is_empty() {
        return None;
    }
    Some((bucket, object))
}

/// Google Cloud Storage reader using the JSON API.
#[derive(Debug, Clone)]
pub struct GcsStore {
    client: Client,
    base_url: String,
}

impl GcsStore {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GCS_API_URL.to_string())
    }

    /// Point at a custom base URL (useful for testing).
    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Storage(format!("invalid storage base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Storage("storage base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    pub async fn download(&self, uri: &str, token: &str) -> Result<Vec<u8>, ProviderError> {
        let (bucket, object) = parse_gs_uri(uri)
            .ok_or_else(|| ProviderError::Storage(format!("not a gs:// object uri: {uri}")))?;
        let url = self.object_url(bucket, object)?;
        debug!(%uri, "downloading video from object storage");

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Storage(format!(
                "download of {uri} failed with status {}: {body}",
                status.as_u16()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_gs_uri() {
        assert_eq!(
            parse_gs_uri("gs://clips/renders/a.mp4"),
            Some(("clips", "renders/a.mp4"))
        );
        assert_eq!(parse_gs_uri("gs://clips/"), None);
        assert_eq!(parse_gs_uri("gs://clips"), None);
        assert_eq!(parse_gs_uri("https://clips/a.mp4"), None);
    }

    #[test]
    fn object_names_are_percent_encoded() {
        let store = GcsStore::with_base_url(Client::new(), "http://localhost:9000".into());
        let url = store.object_url("clips", "renders/a b.mp4").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/storage/v1/b/clips/o/renders%2Fa%20b.mp4?alt=media"
        );
    }

    #[tokio::test]
    async fn downloads_object_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/clips/o/renders%2Fa.mp4"))
            .and(query_param("alt", "media"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcsStore::with_base_url(Client::new(), server.uri());
        let bytes = store.download("gs://clips/renders/a.mp4", "tok").await.unwrap();
        assert_eq!(bytes, b"mp4data");
    }

    #[tokio::test]
    async fn failed_download_is_a_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let store = GcsStore::with_base_url(Client::new(), server.uri());
        let err = store.download("gs://clips/a.mp4", "tok").await.unwrap_err();
        assert!(matches!(err, ProviderError::Storage(msg) if msg.contains("403")));
    }
}
