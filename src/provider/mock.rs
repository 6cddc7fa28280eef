//! Scripted in-memory provider with call counters, for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    Endpoint, ExtensionRequest, GenerationJob, GenerationRequest, JobStatus, MediaRef,
    ProviderError, ProviderKind, VideoProvider,
};

/// `Ok(())` accepts the call; `Err((status, body))` fails it with that HTTP error.
pub(crate) type Scripted = Result<(), (u16, &'static str)>;

pub(crate) struct MockProvider {
    kind: ProviderKind,
    next_id: AtomicUsize,
    submit_script: Mutex<HashMap<Endpoint, VecDeque<Scripted>>>,
    extend_script: Mutex<VecDeque<Scripted>>,
    statuses: Mutex<HashMap<String, JobStatus>>,
    extend_delay: Mutex<Option<Duration>>,
    alternate_auth: AtomicBool,
    submit_calls: Mutex<Vec<Endpoint>>,
    extend_sources: Mutex<Vec<String>>,
    poll_calls: AtomicUsize,
    fallback_calls: AtomicUsize,
}

fn scripted_error((status, body): (u16, &'static str)) -> ProviderError {
    ProviderError::Http {
        status,
        body: body.to_string(),
    }
}

impl MockProvider {
    pub(crate) fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            next_id: AtomicUsize::new(1),
            submit_script: Mutex::new(HashMap::new()),
            extend_script: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            extend_delay: Mutex::new(None),
            alternate_auth: AtomicBool::new(false),
            submit_calls: Mutex::new(Vec::new()),
            extend_sources: Mutex::new(Vec::new()),
            poll_calls: AtomicUsize::new(0),
            fallback_calls: AtomicUsize::new(0),
        }
    }

    /// Outcomes for successive submissions to `endpoint`; unscripted calls succeed.
    pub(crate) fn script_submit(&self, endpoint: &Endpoint, outcomes: Vec<Scripted>) {
        self.submit_script
            .lock()
            .unwrap()
            .insert(endpoint.clone(), outcomes.into());
    }

    /// Outcomes for successive extend calls; unscripted calls succeed.
    pub(crate) fn script_extend(&self, outcomes: Vec<Scripted>) {
        *self.extend_script.lock().unwrap() = outcomes.into();
    }

    /// Status reported by `poll`; handles default to `Completed`.
    pub(crate) fn set_status(&self, handle: &str, status: JobStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(handle.to_string(), status);
    }

    pub(crate) fn set_extend_delay(&self, delay: Duration) {
        *self.extend_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn enable_alternate_auth(&self) {
        self.alternate_auth.store(true, Ordering::SeqCst);
    }

    pub(crate) fn submit_calls(&self) -> Vec<Endpoint> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub(crate) fn extend_count(&self) -> usize {
        self.extend_sources.lock().unwrap().len()
    }

    pub(crate) fn extend_sources(&self) -> Vec<String> {
        self.extend_sources.lock().unwrap().clone()
    }

    pub(crate) fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fallback_count(&self) -> usize {
        self.fallback_calls.load(Ordering::SeqCst)
    }

    fn next_handle(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn job_for(&self, endpoint: &Endpoint, handle: &str) -> GenerationJob {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .unwrap_or(JobStatus::Completed);
        match status {
            JobStatus::Completed => GenerationJob::completed(
                handle,
                self.kind,
                endpoint.clone(),
                Some(MediaRef::Storage {
                    uri: format!("gs://mock/{handle}.mp4"),
                    mime_type: "video/mp4".into(),
                }),
            ),
            JobStatus::Failed => {
                GenerationJob::failed(handle, self.kind, endpoint.clone(), "mock render failed")
            }
            pending => GenerationJob::pending(handle, self.kind, endpoint.clone(), pending, 50),
        }
    }
}

impl VideoProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> Result<GenerationJob, ProviderError> {
        self.submit_calls.lock().unwrap().push(endpoint.clone());
        let outcome = self
            .submit_script
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));
        outcome.map_err(scripted_error)?;
        let handle = self.next_handle("job");
        Ok(GenerationJob::pending(handle, self.kind, endpoint.clone(), JobStatus::Queued, 0)
            .with_duration(request.duration_sec))
    }

    async fn poll(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<GenerationJob, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.job_for(endpoint, handle))
    }

    async fn fetch_bytes(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let job = self.job_for(endpoint, handle);
        if !job.is_completed() {
            return Err(ProviderError::NotReady {
                handle: handle.to_string(),
                status: job.status,
            });
        }
        Ok(handle.as_bytes().to_vec())
    }

    async fn extend(
        &self,
        endpoint: &Endpoint,
        source_handle: &str,
        request: &ExtensionRequest,
    ) -> Result<GenerationJob, ProviderError> {
        self.extend_sources
            .lock()
            .unwrap()
            .push(source_handle.to_string());
        let delay = *self.extend_delay.lock().unwrap();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        let outcome = self
            .extend_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        outcome.map_err(scripted_error)?;
        let handle = self.next_handle("ext");
        Ok(GenerationJob::pending(handle, self.kind, endpoint.clone(), JobStatus::Queued, 0)
            .with_duration(request.increment_sec))
    }

    fn fallback_auth(&self) -> bool {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        self.alternate_auth.swap(false, Ordering::SeqCst)
    }
}
