use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;

use crate::{
    Backend, Body, ClientOptions, ExponentialBackoff, Interceptor, InterceptorChain,
    Request, Response, Result, Retrier, RetryConfig, RetryingExecutor, ReqwestTransport, Sleeper,
    TokioSleeper, Transport,
};

/// Resilient HTTP client: verb helpers over a [`RetryingExecutor`].
///
/// Cloning is cheap; clones share transport and configuration.
#[derive(Clone)]
pub struct Client {
    executor: Arc<RetryingExecutor>,
    options: ClientOptions,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("retrier", &self.executor.retry_config().retrier)
            .field("interceptors", self.executor.interceptors())
            .finish()
    }
}

impl Client {
    /// Creates a client with default options and the `reqwest` backend.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Starts a [`ClientBuilder`] with default options.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a client from explicit options, using the backend they select.
    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Self::builder().options(options).build()
    }

    /// Creates a client from `RESILIENT_HTTP_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::from_options(ClientOptions::from_env()?)
    }

    /// Sends a `GET` with the given headers and no body.
    pub async fn get(&self, url: impl AsRef<str>, headers: HeaderMap) -> Result<Response> {
        let request = Request::new(Method::GET, url)?.headers(headers);
        self.execute(request).await
    }

    /// Sends a `POST`. The body is buffered once and resent on every attempt.
    pub async fn post(
        &self,
        url: impl AsRef<str>,
        body: impl Into<Body>,
        headers: HeaderMap,
    ) -> Result<Response> {
        let request = Request::new(Method::POST, url)?.headers(headers).body(body);
        self.execute(request).await
    }

    /// Sends a `PUT`.
    pub async fn put(
        &self,
        url: impl AsRef<str>,
        body: impl Into<Body>,
        headers: HeaderMap,
    ) -> Result<Response> {
        let request = Request::new(Method::PUT, url)?.headers(headers).body(body);
        self.execute(request).await
    }

    /// Sends a `PATCH`.
    pub async fn patch(
        &self,
        url: impl AsRef<str>,
        body: impl Into<Body>,
        headers: HeaderMap,
    ) -> Result<Response> {
        let request = Request::new(Method::PATCH, url)?.headers(headers).body(body);
        self.execute(request).await
    }

    /// Sends a `DELETE` with no body.
    pub async fn delete(&self, url: impl AsRef<str>, headers: HeaderMap) -> Result<Response> {
        let request = Request::new(Method::DELETE, url)?.headers(headers);
        self.execute(request).await
    }

    /// Runs an arbitrary request through the retry loop.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.executor.execute(request).await
    }

    /// Runs a request that stops with [`HttpError::Cancelled`](crate::HttpError::Cancelled)
    /// once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.executor.execute_with_cancel(request, cancel).await
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Default per-attempt timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.executor.default_timeout()
    }

    /// Retries after the initial attempt.
    pub fn retry_count(&self) -> usize {
        self.executor.retry_config().retry_count
    }

    pub fn retrier(&self) -> &Arc<dyn Retrier> {
        &self.executor.retry_config().retrier
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.executor.interceptors().as_slice()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.executor.transport()
    }
}

/// Collects configuration once; [`build`](Self::build) freezes it into a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    options: ClientOptions,
    retrier: Option<Arc<dyn Retrier>>,
    transport: Option<Arc<dyn Transport>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl ClientBuilder {
    /// Replaces timeout, retry, deadline and backend settings wholesale.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Per-attempt timeout; `Duration::ZERO` disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = millis_rounded_up(timeout);
        self
    }

    /// Retries after the initial attempt; `0` means a single attempt.
    pub fn retry_count(mut self, retry_count: usize) -> Self {
        self.options.max_retries = retry_count;
        self
    }

    /// Backoff policy consulted between attempts.
    pub fn retrier<R: Retrier + 'static>(self, retrier: R) -> Self {
        self.retrier_arc(Arc::new(retrier))
    }

    pub fn retrier_arc(mut self, retrier: Arc<dyn Retrier>) -> Self {
        self.retrier = Some(retrier);
        self
    }

    /// Uses a custom transport instead of the configured backend.
    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Built-in transport to use when no custom transport is supplied.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.options.backend = backend;
        self
    }

    /// Appends one interceptor.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Replaces the interceptor list.
    pub fn interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Replaces how backoff waits are performed, e.g. with a [`TrackingSleeper`](crate::TrackingSleeper) in tests.
    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Sends `Connection: close` on every attempt.
    pub fn close_connection(mut self, close: bool) -> Self {
        self.options.close_connection = close;
        self
    }

    /// Deadline for the whole call, retries and waits included.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.options.total_timeout_ms = Some(millis_rounded_up(timeout));
        self
    }

    /// Freezes the configuration. Fails only when the default transport cannot be created.
    pub fn build(self) -> Result<Client> {
        let options = self.options;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(options.backend)?,
        };
        let retrier: Arc<dyn Retrier> = match self.retrier {
            Some(retrier) => retrier,
            None => Arc::new(ExponentialBackoff::new(Duration::from_millis(
                options.retry_backoff_ms,
            ))),
        };
        let sleeper: Arc<dyn Sleeper> = match self.sleeper {
            Some(sleeper) => sleeper,
            None => Arc::new(TokioSleeper),
        };
        let timeout = (options.timeout_ms > 0).then(|| Duration::from_millis(options.timeout_ms));

        let executor = RetryingExecutor::new(transport, RetryConfig::new(options.max_retries, retrier))
            .with_interceptors(InterceptorChain::new(self.interceptors))
            .with_sleeper(sleeper)
            .with_default_timeout(timeout)
            .with_close_connection(options.close_connection)
            .with_total_timeout(options.total_timeout_ms.map(Duration::from_millis));

        Ok(Client {
            executor: Arc::new(executor),
            options,
        })
    }
}

/// Whole milliseconds, rounded up; only `Duration::ZERO` maps to `0`.
fn millis_rounded_up(duration: Duration) -> u64 {
    let millis = duration.as_millis() + u128::from(duration.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn default_transport(backend: Backend) -> Result<Arc<dyn Transport>> {
    match backend {
        Backend::Reqwest => Ok(Arc::new(ReqwestTransport::new()?)),
        #[cfg(feature = "hyper")]
        Backend::Hyper => Ok(Arc::new(crate::HyperTransport::http())),
        #[cfg(not(feature = "hyper"))]
        Backend::Hyper => Err(crate::HttpError::Build(
            "the hyper backend requires the `hyper` feature".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use http::{HeaderMap, Method, StatusCode};

    use super::Client;
    use crate::{
        BufferedRequest, ClientOptions, ConstantBackoff, HttpError, Interceptor, Response,
        Retrier, TrackingSleeper, Transport, TransportError,
    };

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Method, Option<Vec<u8>>, Option<String>)>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: &mut BufferedRequest) -> Result<Response, TransportError> {
            let trace = request
                .headers()
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = request.body_mut().map(|b| b.take_remaining().to_vec());
            self.seen
                .lock()
                .expect("seen")
                .push((request.method().clone(), body, trace));
            Ok(Response::new(StatusCode::NO_CONTENT))
        }
    }

    struct Noop;

    impl Interceptor for Noop {}

    #[tokio::test]
    async fn verbs_carry_bodies_only_where_expected() {
        let recorder = Arc::new(Recorder::default());
        let client = Client::builder()
            .transport_arc(recorder.clone())
            .build()
            .expect("client must build");
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "abc".parse().expect("header value"));
        let url = "http://example.com/things/1";

        client.get(url, headers.clone()).await.expect("get");
        client.post(url, "p", headers.clone()).await.expect("post");
        client.put(url, "u", headers.clone()).await.expect("put");
        client.patch(url, "a", headers.clone()).await.expect("patch");
        client.delete(url, headers).await.expect("delete");

        let seen = recorder.seen.lock().expect("seen").clone();
        let trace = Some("abc".to_owned());
        assert_eq!(
            seen,
            vec![
                (Method::GET, None, trace.clone()),
                (Method::POST, Some(b"p".to_vec()), trace.clone()),
                (Method::PUT, Some(b"u".to_vec()), trace.clone()),
                (Method::PATCH, Some(b"a".to_vec()), trace.clone()),
                (Method::DELETE, None, trace),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_url_fails_without_sending() {
        let recorder = Arc::new(Recorder::default());
        let client = Client::builder()
            .transport_arc(recorder.clone())
            .retry_count(3)
            .build()
            .expect("client must build");

        let err = client
            .get("::not-a-url::", HeaderMap::new())
            .await
            .expect_err("url must be rejected");

        assert!(matches!(err, HttpError::InvalidRequest(_)));
        assert!(recorder.seen.lock().expect("seen").is_empty());
    }

    #[test]
    fn builder_applies_configuration_once() {
        let client = Client::builder()
            .options(ClientOptions {
                max_retries: 1,
                ..ClientOptions::default()
            })
            .retry_count(4)
            .timeout(Duration::from_secs(2))
            .retrier(ConstantBackoff::new(Duration::from_millis(5)))
            .interceptor(Noop)
            .interceptor(Noop)
            .sleeper(TrackingSleeper::new())
            .transport(Recorder::default())
            .build()
            .expect("client must build");

        assert_eq!(client.retry_count(), 4);
        assert_eq!(client.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(client.retrier().next_interval(3), Duration::from_millis(5));
        assert_eq!(client.interceptors().len(), 2);
    }

    #[test]
    fn default_retrier_follows_backoff_option() {
        let client = Client::builder()
            .options(ClientOptions {
                retry_backoff_ms: 100,
                timeout_ms: 0,
                ..ClientOptions::default()
            })
            .transport(Recorder::default())
            .build()
            .expect("client must build");

        assert_eq!(client.retrier().next_interval(0), Duration::from_millis(100));
        assert_eq!(client.retrier().next_interval(2), Duration::from_millis(400));
        assert_eq!(client.timeout(), None);
    }

    #[test]
    fn sub_millisecond_timeouts_round_up_instead_of_disabling() {
        let client = Client::builder()
            .timeout(Duration::from_micros(500))
            .total_timeout(Duration::from_nanos(1))
            .transport(Recorder::default())
            .build()
            .expect("client must build");

        assert_eq!(client.timeout(), Some(Duration::from_millis(1)));
        assert_eq!(client.options().timeout_ms, 1);
        assert_eq!(client.options().total_timeout_ms, Some(1));

        let zero = Client::builder()
            .timeout(Duration::ZERO)
            .transport(Recorder::default())
            .build()
            .expect("client must build");
        assert_eq!(zero.timeout(), None);

        let exact = Client::builder()
            .timeout(Duration::from_millis(1500))
            .transport(Recorder::default())
            .build()
            .expect("client must build");
        assert_eq!(exact.options().timeout_ms, 1500);
    }

    #[test]
    fn debug_lists_options() {
        let client = Client::builder()
            .transport(Recorder::default())
            .build()
            .expect("client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("ClientOptions"));
        assert!(debug.contains("timeout_ms: 30000"));
    }
}
