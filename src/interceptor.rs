use std::fmt;
use std::sync::Arc;

use crate::{BufferedRequest, Response, TransportError};

/// Observer of the request lifecycle.
///
/// Hooks run synchronously, in registration order, on the task executing the
/// request. They cannot abort the request; a panic in a hook is not caught.
pub trait Interceptor: Send + Sync {
    /// Before every attempt.
    fn on_request_start(&self, _request: &BufferedRequest) {}

    /// After every attempt that produced a response, including 5xx responses.
    fn on_request_end(&self, _request: &BufferedRequest, _response: &Response) {}

    /// After every attempt that failed at the transport level.
    fn on_error(&self, _request: &BufferedRequest, _error: &TransportError) {}
}

/// Ordered, fixed set of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn as_slice(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub(crate) fn on_request_start(&self, request: &BufferedRequest) {
        for interceptor in &self.interceptors {
            interceptor.on_request_start(request);
        }
    }

    pub(crate) fn on_request_end(&self, request: &BufferedRequest, response: &Response) {
        for interceptor in &self.interceptors {
            interceptor.on_request_end(request, response);
        }
    }

    pub(crate) fn on_error(&self, request: &BufferedRequest, error: &TransportError) {
        for interceptor in &self.interceptors {
            interceptor.on_error(request, error);
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Logs every lifecycle event through `tracing`.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingInterceptor;

#[cfg(feature = "tracing")]
impl Interceptor for TracingInterceptor {
    fn on_request_start(&self, request: &BufferedRequest) {
        tracing::info!(method = %request.method(), url = %request.url(), "http request start");
    }

    fn on_request_end(&self, request: &BufferedRequest, response: &Response) {
        tracing::info!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            "http request end"
        );
    }

    fn on_error(&self, request: &BufferedRequest, error: &TransportError) {
        tracing::warn!(
            method = %request.method(),
            url = %request.url(),
            kind = ?error.kind(),
            error = %error,
            "http request failed"
        );
    }
}
