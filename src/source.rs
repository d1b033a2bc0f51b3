//! Collection sources for the client engine.
//!
//! A [`CollectionSource`] yields the full collection for a record type and a
//! [`ClinicClient`] runs write actions. [`StoreSource`] does both against an
//! in-process [`ClinicStore`]; `HttpSource` (feature `remote`) calls the
//! action endpoint. [`Retrying`] wraps either with a per-attempt timeout and
//! exponential backoff for reads.

use crate::api::{dispatch, ApiReply, ApiRequest};
use crate::config::ClientConfig;
use crate::entities::Record;
use crate::error::ClinicError;
use crate::store::ClinicStore;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] ClinicError),
}

impl FetchError {
    /// Timeouts and transport failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Transport(_))
    }
}

pub trait CollectionSource: Send + Sync + 'static {
    /// Every row of `R`'s collection.
    fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send;
}

impl<S: CollectionSource> CollectionSource for Arc<S> {
    fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send {
        self.as_ref().fetch_all::<R>()
    }
}

/// Write side of the client: one endpoint action per call.
pub trait ClinicClient: Send + Sync + 'static {
    /// Run `action` with `params` and return the reply body of a success.
    fn call(
        &self,
        action: &'static str,
        params: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

impl<S: ClinicClient> ClinicClient for Arc<S> {
    fn call(
        &self,
        action: &'static str,
        params: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send {
        self.as_ref().call(action, params)
    }
}

/// The error carried by an endpoint reply: a non-2xx status or `"ok": false`.
///
/// Validation replies list every problem; they are joined with `"; "`.
pub fn reply_error(status: u16, body: &Value) -> Option<FetchError> {
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if (200..300).contains(&status) && ok {
        return None;
    }

    let message = match (
        body.get("error").and_then(Value::as_str),
        body.get("errors").and_then(Value::as_array),
    ) {
        (Some(error), _) => error.to_string(),
        (None, Some(errors)) => errors
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        (None, None) => format!("status {}", status),
    };

    Some(FetchError::Api { status, message })
}

// ============================================================================
// IN-PROCESS STORE
// ============================================================================

#[derive(Clone)]
pub struct StoreSource {
    store: Arc<Mutex<ClinicStore>>,
}

impl StoreSource {
    pub fn new(store: Arc<Mutex<ClinicStore>>) -> Self {
        StoreSource { store }
    }

    pub fn store(&self) -> &Arc<Mutex<ClinicStore>> {
        &self.store
    }
}

impl CollectionSource for StoreSource {
    fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send {
        let store = Arc::clone(&self.store);
        async move {
            let rows = tokio::task::spawn_blocking(move || {
                let guard = store.lock().map_err(|_| ClinicError::Poisoned)?;
                R::list_from(&guard)
            })
            .await
            .map_err(|e| FetchError::Transport(format!("store task failed: {e}")))??;

            Ok(rows)
        }
    }
}

impl ClinicClient for StoreSource {
    fn call(
        &self,
        action: &'static str,
        mut params: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let store = Arc::clone(&self.store);
        async move {
            params.insert("action".to_string(), Value::from(action));
            let request = ApiRequest::from_json(Value::Object(params));

            let reply = tokio::task::spawn_blocking(move || dispatch(&store, &request))
                .await
                .map_err(|e| FetchError::Transport(format!("store task failed: {e}")))?;

            match reply {
                ApiReply::Json { status, body } => match reply_error(status, &body) {
                    Some(err) => Err(err),
                    None => Ok(body),
                },
                ApiReply::Csv { body, .. } => Ok(Value::String(String::from_utf8_lossy(&body).into_owned())),
            }
        }
    }
}

// ============================================================================
// HTTP (action endpoint)
// ============================================================================

#[cfg(feature = "remote")]
pub use http::HttpSource;

#[cfg(feature = "remote")]
mod http {
    use super::{reply_error, ClinicClient, CollectionSource, FetchError};
    use crate::entities::Record;
    use serde_json::{Map, Value};
    use std::future::Future;
    use std::time::Duration;

    /// Client for the `/api` action endpoint.
    #[derive(Clone)]
    pub struct HttpSource {
        client: reqwest::Client,
        endpoint: String,
        timeout: Option<Duration>,
    }

    impl HttpSource {
        pub fn new(base_url: &str) -> Result<Self, FetchError> {
            Self::build(base_url, None)
        }

        /// Like [`HttpSource::new`], with every request bounded by `timeout`.
        pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
            Self::build(base_url, Some(timeout))
        }

        fn build(base_url: &str, timeout: Option<Duration>) -> Result<Self, FetchError> {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder
                .build()
                .map_err(|e| FetchError::Transport(format!("build client: {e}")))?;

            Ok(HttpSource {
                client,
                endpoint: format!("{}/api", base_url.trim_end_matches('/')),
                timeout,
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        /// GET one read action with query parameters.
        pub async fn get_action(&self, action: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
            let mut query: Vec<(&str, &str)> = vec![("action", action)];
            query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

            let response = self
                .client
                .get(&self.endpoint)
                .query(&query)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            self.decode(action, response).await
        }

        /// POST one action with a JSON object body.
        pub async fn post_action(&self, action: &str, mut params: Map<String, Value>) -> Result<Value, FetchError> {
            params.insert("action".to_string(), Value::from(action));

            let response = self
                .client
                .post(&self.endpoint)
                .json(&Value::Object(params))
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            self.decode(action, response).await
        }

        async fn decode(&self, action: &str, response: reqwest::Response) -> Result<Value, FetchError> {
            let status = response.status().as_u16();
            let body: Value = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    self.transport_error(e)
                } else {
                    FetchError::Decode(format!("{action}: {e}"))
                }
            })?;

            match reply_error(status, &body) {
                Some(err) => Err(err),
                None => Ok(body),
            }
        }

        fn transport_error(&self, err: reqwest::Error) -> FetchError {
            if err.is_timeout() {
                FetchError::Timeout(self.timeout.unwrap_or_default())
            } else {
                FetchError::Transport(err.to_string())
            }
        }
    }

    impl CollectionSource for HttpSource {
        fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send {
            async move {
                let domain = R::DOMAIN;
                let mut body = self.get_action(domain.list_action(), &[]).await?;

                let rows = body
                    .get_mut(domain.collection_key())
                    .map(Value::take)
                    .ok_or_else(|| {
                        FetchError::Decode(format!("response missing '{}'", domain.collection_key()))
                    })?;

                serde_json::from_value(rows).map_err(|e| FetchError::Decode(e.to_string()))
            }
        }
    }

    impl ClinicClient for HttpSource {
        fn call(
            &self,
            action: &'static str,
            params: Map<String, Value>,
        ) -> impl Future<Output = Result<Value, FetchError>> + Send {
            self.post_action(action, params)
        }
    }
}

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(10),
            retries: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        RetryPolicy {
            timeout: config.request_timeout(),
            retries: config.retries,
            ..RetryPolicy::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(%label, attempt, ?delay, error = %err, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// A source whose fetches go through a [`RetryPolicy`].
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: CollectionSource> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Retrying { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: CollectionSource> CollectionSource for Retrying<S> {
    fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send {
        self.policy
            .run(R::DOMAIN.as_str(), move || self.inner.fetch_all::<R>())
    }
}

/// Writes are not repeated: one attempt, bounded by the policy timeout.
impl<S: ClinicClient> ClinicClient for Retrying<S> {
    fn call(
        &self,
        action: &'static str,
        params: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let timeout = self.policy.timeout;
        let call = self.inner.call(action, params);
        async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::entities::{Domain, Owner, Pet, Visit};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source: queued failures first, then the fixed rows.
    /// Writes are recorded and answer `{"ok": true}` unless a write failure is queued.
    #[derive(Default)]
    pub struct FakeSource {
        pub owners: Mutex<Vec<Owner>>,
        pub pets: Mutex<Vec<Pet>>,
        pub visits: Mutex<Vec<Visit>>,
        pub failures: Mutex<VecDeque<FetchError>>,
        pub delay: Mutex<Option<Duration>>,
        pub calls: AtomicUsize,
        pub writes: Mutex<Vec<(String, Map<String, Value>)>>,
        pub write_failures: Mutex<VecDeque<FetchError>>,
    }

    impl FakeSource {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn set_pets(&self, pets: Vec<Pet>) {
            *self.pets.lock().unwrap() = pets;
        }

        pub fn fail_next(&self, err: FetchError) {
            self.failures.lock().unwrap().push_back(err);
        }

        pub fn fail_next_write(&self, err: FetchError) {
            self.write_failures.lock().unwrap().push_back(err);
        }

        pub fn writes(&self) -> Vec<(String, Map<String, Value>)> {
            self.writes.lock().unwrap().clone()
        }

        fn rows<R: Record>(&self) -> Vec<R> {
            let value = match R::DOMAIN {
                Domain::Owners => serde_json::to_value(&*self.owners.lock().unwrap()),
                Domain::Pets => serde_json::to_value(&*self.pets.lock().unwrap()),
                Domain::Visits => serde_json::to_value(&*self.visits.lock().unwrap()),
            };
            serde_json::from_value(value.unwrap()).unwrap()
        }
    }

    impl CollectionSource for FakeSource {
        fn fetch_all<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, FetchError>> + Send {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let failure = self.failures.lock().unwrap().pop_front();
                match failure {
                    Some(err) => Err(err),
                    None => Ok(self.rows::<R>()),
                }
            }
        }
    }

    impl ClinicClient for FakeSource {
        fn call(
            &self,
            action: &'static str,
            params: Map<String, Value>,
        ) -> impl Future<Output = Result<Value, FetchError>> + Send {
            async move {
                self.writes.lock().unwrap().push((action.to_string(), params));
                let failure = self.write_failures.lock().unwrap().pop_front();
                match failure {
                    Some(err) => Err(err),
                    None => Ok(serde_json::json!({ "ok": true })),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;
    use crate::entities::{OwnerDraft, Pet, PetDraft};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retryable_variants() {
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(!FetchError::Api { status: 500, message: "x".into() }.is_retryable());
        assert!(!FetchError::Decode("x".into()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried() {
        let source = FakeSource::default();
        source.fail_next(FetchError::Transport("reset".into()));
        source.fail_next(FetchError::Transport("reset".into()));
        let retrying = Retrying::new(source, RetryPolicy::default());

        let pets: Vec<Pet> = retrying.fetch_all().await.unwrap();

        assert!(pets.is_empty());
        assert_eq!(retrying.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_surface_last_error() {
        let source = FakeSource::default();
        for _ in 0..3 {
            source.fail_next(FetchError::Transport("down".into()));
        }
        let retrying = Retrying::new(source, RetryPolicy::default());

        let err = retrying.fetch_all::<Pet>().await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        assert_eq!(retrying.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_errors_are_not_retried() {
        let source = FakeSource::default();
        source.fail_next(FetchError::Api { status: 500, message: "database error".into() });
        let retrying = Retrying::new(source, RetryPolicy::default());

        let err = retrying.fetch_all::<Pet>().await.unwrap_err();

        assert!(matches!(err, FetchError::Api { status: 500, .. }));
        assert_eq!(retrying.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_then_retries() {
        let source = FakeSource::default();
        *source.delay.lock().unwrap() = Some(Duration::from_secs(30));
        let policy = RetryPolicy {
            retries: 1,
            ..RetryPolicy::default()
        };
        let retrying = Retrying::new(source, policy);

        let err = retrying.fetch_all::<Pet>().await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout(_)));
        assert_eq!(retrying.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_store_source_lists_collections() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        store
            .create_owner(&OwnerDraft::new("Ana", "Ruiz", 30), &BTreeSet::new())
            .unwrap();
        store
            .create_pet(
                &PetDraft::new("Toby", 2, "Perro", "2022-01-01"),
                &[1].into_iter().collect(),
            )
            .unwrap();
        let source = StoreSource::new(Arc::new(Mutex::new(store)));

        let pets: Vec<Pet> = source.fetch_all().await.unwrap();

        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0].owner_ids, vec![1]);
    }

    #[test]
    fn test_reply_error_reads_error_and_error_lists() {
        assert!(reply_error(201, &json!({"ok": true, "pet_id": 3})).is_none());

        match reply_error(422, &json!({"ok": false, "errors": ["name is required", "age must be >= 0"]})) {
            Some(FetchError::Api { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "name is required; age must be >= 0");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match reply_error(200, &json!({"ok": false, "error": "pet not paired"})) {
            Some(FetchError::Api { message, .. }) => assert_eq!(message, "pet not paired"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_source_runs_write_actions() {
        let store = Arc::new(Mutex::new(ClinicStore::open_in_memory().unwrap()));
        let source = StoreSource::new(Arc::clone(&store));

        let body = source
            .call(
                "create_owner",
                params(json!({"first_name": "Ana", "last_name": "Ruiz", "age": "30"})),
            )
            .await
            .unwrap();
        assert_eq!(body["owner_id"], 1);

        let err = source
            .call("create_pet", params(json!({"name": "", "species": "Gato"})))
            .await
            .unwrap_err();
        match err {
            FetchError::Api { status, message } => {
                assert_eq!(status, 422);
                assert!(message.starts_with("name is required; "), "{message}");
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(store.lock().unwrap().list_owners().unwrap().len(), 1);
        assert!(store.lock().unwrap().list_pets().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_attempted_once() {
        let source = FakeSource::default();
        source.fail_next_write(FetchError::Transport("reset".into()));
        let retrying = Retrying::new(source, RetryPolicy::default());

        let err = retrying.call("delete_pet", params(json!({"id": 1}))).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        assert_eq!(retrying.inner().writes().len(), 1);
    }
}
