//! Endpoint/model discovery.
//!
//! Model availability differs per project and region, so the first
//! submission of a logical video walks an ordered candidate list until one
//! endpoint accepts it. The winning endpoint is kept on the job (and plan)
//! and reused for every later call.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TimeoutPolicy;
use crate::error::ClipError;
use crate::provider::{Endpoint, GenerationJob, GenerationRequest, ProviderError, VideoProvider};

/// Models crossed with regions, model-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    pub models: Vec<String>,
    pub regions: Vec<String>,
}

impl CandidateList {
    pub fn new(models: Vec<String>, regions: Vec<String>) -> Self {
        Self { models, regions }
    }

    /// Every (model, region) pair in priority order, without duplicates.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = Vec::with_capacity(self.models.len() * self.regions.len());
        for model in &self.models {
            for region in &self.regions {
                let endpoint = Endpoint::new(model.trim(), region.trim());
                if endpoint.model.is_empty() || endpoint.region.is_empty() {
                    continue;
                }
                if !out.contains(&endpoint) {
                    out.push(endpoint);
                }
            }
        }
        out
    }
}

/// A submission some candidate accepted.
#[derive(Debug)]
pub struct Resolved {
    pub endpoint: Endpoint,
    pub job: GenerationJob,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no endpoint accepted the request (tried {}){}", EndpointList(.tried), last_error_suffix(.last_error))]
    Exhausted {
        tried: Vec<Endpoint>,
        last_error: Option<ProviderError>,
    },

    #[error("output storage URI is required by every candidate (tried {}): {last_error}", EndpointList(.tried))]
    MissingStorage {
        tried: Vec<Endpoint>,
        last_error: ProviderError,
    },

    #[error("authentication rejected at {endpoint}: {source}")]
    Authentication {
        endpoint: Endpoint,
        source: ProviderError,
    },

    #[error("{endpoint} rejected the request: {source}")]
    Rejected {
        endpoint: Endpoint,
        source: ProviderError,
    },
}

struct EndpointList<'a>(&'a [Endpoint]);

impl fmt::Display for EndpointList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        for (i, endpoint) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{endpoint}")?;
        }
        Ok(())
    }
}

fn last_error_suffix(last_error: &Option<ProviderError>) -> String {
    match last_error {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}

impl From<ResolveError> for ClipError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Exhausted { .. } | ResolveError::MissingStorage { .. } => {
                ClipError::Configuration(err.to_string())
            }
            ResolveError::Authentication { .. } => ClipError::AuthenticationFailed(err.to_string()),
            ResolveError::Rejected { source, .. } => ClipError::Provider(source),
        }
    }
}

fn is_auth_failure(err: &ProviderError) -> bool {
    err.is_unauthorized() || matches!(err, ProviderError::Auth(_))
}

/// Submit `request` to the first candidate that accepts it.
///
/// 404s and missing-storage 400s move on to the next candidate. An auth
/// failure switches the provider to its alternate credentials once per
/// resolution and retries the same candidate; anything else stops.
pub async fn resolve<P: VideoProvider>(
    provider: &P,
    candidates: &[Endpoint],
    request: &GenerationRequest,
    timeouts: &TimeoutPolicy,
) -> Result<Resolved, ResolveError> {
    let mut tried: Vec<Endpoint> = Vec::new();
    let mut last_error: Option<ProviderError> = None;
    let mut storage_missing = false;
    let mut auth_fallback_used = false;

    for endpoint in candidates {
        tried.push(endpoint.clone());
        let mut retried_auth = false;

        loop {
            debug!(provider = %provider.kind(), %endpoint, "trying endpoint");
            let result = timeouts
                .run(request.duration_sec, provider.submit(endpoint, request))
                .await;

            let err = match result {
                Ok(job) => {
                    info!(
                        provider = %provider.kind(),
                        %endpoint,
                        handle = %job.handle,
                        "endpoint accepted submission"
                    );
                    return Ok(Resolved {
                        endpoint: endpoint.clone(),
                        job,
                    });
                }
                Err(err) => err,
            };

            if is_auth_failure(&err) {
                if !retried_auth && !auth_fallback_used {
                    auth_fallback_used = true;
                    if provider.fallback_auth() {
                        retried_auth = true;
                        warn!(
                            %endpoint,
                            error = %err,
                            "authentication failed, retrying with alternate credentials"
                        );
                        continue;
                    }
                }
                return Err(ResolveError::Authentication {
                    endpoint: endpoint.clone(),
                    source: err,
                });
            }

            if err.is_not_found() {
                debug!(%endpoint, "endpoint not available, trying next");
            } else if err.is_storage_prerequisite() {
                warn!(%endpoint, "endpoint requires an output storage URI, trying next");
                storage_missing = true;
            } else {
                return Err(ResolveError::Rejected {
                    endpoint: endpoint.clone(),
                    source: err,
                });
            }
            last_error = Some(err);
            break;
        }
    }

    match last_error {
        Some(last_error) if storage_missing => {
            Err(ResolveError::MissingStorage { tried, last_error })
        }
        last_error => Err(ResolveError::Exhausted { tried, last_error }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::{ProviderKind, Resolution};

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a lighthouse at dusk".into(),
            duration_sec: 8,
            resolution: Resolution::Landscape720,
        }
    }

    fn candidates() -> Vec<Endpoint> {
        CandidateList::new(
            vec!["veo-a".into(), "veo-b".into()],
            vec!["us-central1".into(), "europe-west4".into()],
        )
        .endpoints()
    }

    #[test]
    fn candidate_order_is_model_major_without_duplicates() {
        let list = CandidateList::new(
            vec!["m1".into(), "m2".into(), "m1".into()],
            vec!["r1".into(), "r2".into(), " ".into()],
        );
        let endpoints = list.endpoints();
        assert_eq!(
            endpoints,
            vec![
                Endpoint::new("m1", "r1"),
                Endpoint::new("m1", "r2"),
                Endpoint::new("m2", "r1"),
                Endpoint::new("m2", "r2"),
            ]
        );
    }

    #[tokio::test]
    async fn first_accepting_candidate_wins() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        let resolved = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap();
        assert_eq!(resolved.endpoint, list[0]);
        assert_eq!(resolved.job.endpoint, list[0]);
        assert_eq!(provider.submit_calls().len(), 1);
    }

    #[tokio::test]
    async fn not_found_and_storage_errors_fall_through() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        provider.script_submit(&list[0], vec![Err((404, "model not found"))]);
        provider.script_submit(&list[1], vec![Err((400, "storageUri is required"))]);

        let resolved = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap();
        assert_eq!(resolved.endpoint, list[2]);
        assert_eq!(provider.submit_calls(), list[..3].to_vec());
    }

    #[tokio::test]
    async fn exhaustion_lists_every_candidate() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        for endpoint in &list {
            provider.script_submit(endpoint, vec![Err((404, "not found"))]);
        }

        let err = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        match &err {
            ResolveError::Exhausted { tried, last_error } => {
                assert_eq!(tried, &list);
                assert!(last_error.as_ref().is_some_and(|e| e.is_not_found()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("veo-b@europe-west4"));
        assert!(matches!(ClipError::from(err), ClipError::Configuration(_)));
    }

    #[tokio::test]
    async fn empty_candidate_list_is_exhausted() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let err = resolve(&provider, &[], &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Exhausted { ref tried, last_error: None } if tried.is_empty()
        ));
    }

    #[tokio::test]
    async fn missing_storage_everywhere_is_a_configuration_error() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        for endpoint in &list {
            provider.script_submit(endpoint, vec![Err((400, "output storage URI must be set"))]);
        }

        let err = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingStorage { .. }));
        match ClipError::from(err) {
            ClipError::Configuration(message) => assert!(message.contains("storage URI")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_switches_auth_once_and_retries_same_candidate() {
        let provider = MockProvider::new(ProviderKind::Veo);
        provider.enable_alternate_auth();
        let list = candidates();
        provider.script_submit(&list[0], vec![Err((401, "invalid token"))]);

        let resolved = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap();
        assert_eq!(resolved.endpoint, list[0]);
        assert_eq!(provider.fallback_count(), 1);
        assert_eq!(provider.submit_calls(), vec![list[0].clone(), list[0].clone()]);
    }

    #[tokio::test]
    async fn second_unauthorized_stops_without_cycling_candidates() {
        let provider = MockProvider::new(ProviderKind::Veo);
        provider.enable_alternate_auth();
        let list = candidates();
        provider.script_submit(&list[0], vec![Err((401, "bad")), Err((401, "still bad"))]);

        let err = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Authentication { .. }));
        assert_eq!(provider.submit_calls().len(), 2);
        assert_eq!(provider.fallback_count(), 1);
        assert!(matches!(
            ClipError::from(err),
            ClipError::AuthenticationFailed(_)
        ));
    }

    #[tokio::test]
    async fn unauthorized_without_alternate_stops_immediately() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        provider.script_submit(&list[0], vec![Err((401, "bad"))]);

        let err = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Authentication { .. }));
        assert_eq!(provider.submit_calls().len(), 1);
    }

    #[tokio::test]
    async fn other_errors_stop_resolution() {
        let provider = MockProvider::new(ProviderKind::Veo);
        let list = candidates();
        provider.script_submit(&list[0], vec![Err((400, "prompt violates safety guidelines"))]);

        let err = resolve(&provider, &list, &request(), &TimeoutPolicy::default())
            .await
            .unwrap_err();
        match err {
            ResolveError::Rejected { endpoint, source } => {
                assert_eq!(endpoint, list[0]);
                assert!(source.is_content_policy());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(provider.submit_calls().len(), 1);
    }
}
