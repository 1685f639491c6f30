//! The retrying request executor.
//!
//! One logical request becomes up to `retry_count + 1` physical attempts:
//! - the body is snapshotted once and rewound before every attempt;
//! - transport errors are recorded, reported to `on_error`, and retried;
//! - responses with status ≥ 500 are reported to `on_request_end` and retried;
//! - any other response ends the loop and clears recorded errors;
//! - no wait follows the final attempt.
//!
//! Every wait and every send is raced against the caller's cancellation token,
//! and the whole call against the optional total deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    HttpError, InterceptorChain, Request, Response, Result, Retrier, Sleeper,
    TokioSleeper, Transport, TransportError,
};

/// How many times to retry and how long to wait in between.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts = `retry_count + 1`.
    pub retry_count: usize,
    /// Consulted for the wait before each retry.
    pub retrier: Arc<dyn Retrier>,
}

impl RetryConfig {
    /// Pairs a retry budget with the policy that spaces the retries out.
    pub fn new(retry_count: usize, retrier: Arc<dyn Retrier>) -> Self {
        Self {
            retry_count,
            retrier,
        }
    }
}

enum AttemptOutcome {
    Success(Response),
    TransportError(TransportError),
    ServerError(Response),
}

impl From<std::result::Result<Response, TransportError>> for AttemptOutcome {
    fn from(result: std::result::Result<Response, TransportError>) -> Self {
        match result {
            Ok(response) if response.is_server_error() => AttemptOutcome::ServerError(response),
            Ok(response) => AttemptOutcome::Success(response),
            Err(err) => AttemptOutcome::TransportError(err),
        }
    }
}

/// Drives attempts of a single request against a [`Transport`].
pub struct RetryingExecutor {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    interceptors: InterceptorChain,
    sleeper: Arc<dyn Sleeper>,
    default_timeout: Option<Duration>,
    close_connection: bool,
    total_timeout: Option<Duration>,
}

impl fmt::Debug for RetryingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingExecutor")
            .field("retry", &self.retry)
            .field("interceptors", &self.interceptors)
            .field("sleeper", &self.sleeper)
            .field("default_timeout", &self.default_timeout)
            .field("close_connection", &self.close_connection)
            .field("total_timeout", &self.total_timeout)
            .finish_non_exhaustive()
    }
}

impl RetryingExecutor {
    /// Creates an executor with no interceptors, the tokio sleeper, and no
    /// timeouts.
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry,
            interceptors: InterceptorChain::default(),
            sleeper: Arc::new(TokioSleeper),
            default_timeout: None,
            close_connection: false,
            total_timeout: None,
        }
    }

    /// Replaces the interceptor chain; hooks run in the chain's order.
    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Replaces how backoff waits are performed.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Per-attempt timeout applied to requests that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sends `Connection: close` on requests that do not choose for themselves.
    pub fn with_close_connection(mut self, close: bool) -> Self {
        self.close_connection = close;
        self
    }

    /// Deadline for the whole call, retries and waits included.
    pub fn with_total_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Runs `request` through the retry loop without a cancellation signal.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), returning [`HttpError::Cancelled`] as soon
    /// as `cancel` fires, whether a send or a backoff wait is in progress.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let run = self.run(request, cancel);
        match self.total_timeout {
            Some(deadline) => tokio::time::timeout(deadline, run)
                .await
                .map_err(|_| HttpError::DeadlineExceeded(deadline))?,
            None => run.await,
        }
    }

    async fn run(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let mut request = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HttpError::Cancelled),
            buffered = request.into_buffered(self.default_timeout, self.close_connection) => buffered?,
        };
        let retry_count = self.retry.retry_count;
        let mut errors: Vec<TransportError> = Vec::new();
        let mut last_response: Option<Response> = None;

        for attempt in 0..=retry_count {
            // Release the previous attempt's response before reusing the slot.
            if let Some(previous) = last_response.take() {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt,
                    status = previous.status().as_u16(),
                    "releasing previous response"
                );
                drop(previous);
            }

            self.interceptors.on_request_start(&request);
            request.rewind_body();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                method = %request.method(),
                url = %request.url(),
                "sending request"
            );

            let outcome: AttemptOutcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                result = self.transport.send(&mut request) => result.into(),
            };

            match outcome {
                AttemptOutcome::Success(response) => {
                    // Recorded errors are discarded on success.
                    self.interceptors.on_request_end(&request, &response);
                    return Ok(response);
                }
                AttemptOutcome::ServerError(response) => {
                    self.interceptors.on_request_end(&request, &response);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt,
                        status = response.status().as_u16(),
                        "server error response"
                    );
                    last_response = Some(response);
                }
                AttemptOutcome::TransportError(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, kind = ?err.kind(), error = %err, "transport error");
                    self.interceptors.on_error(&request, &err);
                    errors.push(err);
                }
            }

            if attempt < retry_count {
                self.wait_before_retry(attempt, cancel).await?;
            }
        }

        match last_response {
            Some(response) if errors.is_empty() => Ok(response),
            last_response => Err(HttpError::RetriesExhausted {
                errors,
                last_response: last_response.map(Box::new),
            }),
        }
    }

    async fn wait_before_retry(&self, attempt: usize, cancel: &CancellationToken) -> Result<()> {
        let delay = self.retry.retrier.next_interval(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request after backoff");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HttpError::Cancelled),
            _ = self.sleeper.sleep(delay) => Ok(()),
        }
    }
}
