//! `resilient-http` is an async HTTP client with retry/backoff and interceptors.
//!
//! A single [`RetryingExecutor`] drives every call over an interchangeable
//! [`Transport`]: [`ReqwestTransport`] for general use, or `HyperTransport`
//! (feature `hyper`) for a lean pooled client. [`Client`] adds the verb helpers:
//! - [`Client::get`]
//! - [`Client::post`]
//! - [`Client::put`]
//! - [`Client::patch`]
//! - [`Client::delete`]
//!
//! Transport errors and responses with status ≥ 500 are retried up to
//! `retry_count` times. A final 5xx response is returned as a response, not as
//! an error; check [`Response::status`].

mod backoff;
mod body;
mod client;
mod error;
mod executor;
mod interceptor;
mod options;
mod sleeper;
mod transport;
mod types;

pub use backoff::{
    ConstantBackoff, ExponentialBackoff, Jittered, LinearBackoff, NoBackoff, Retrier, MAX_BACKOFF,
};
pub use body::{Body, ReplayBody};
pub use client::{Client, ClientBuilder};
pub use error::{HttpError, TransportError, TransportErrorKind};
pub use executor::{RetryConfig, RetryingExecutor};
#[cfg(feature = "tracing")]
pub use interceptor::TracingInterceptor;
pub use interceptor::{Interceptor, InterceptorChain};
pub use options::{Backend, ClientOptions};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
#[cfg(feature = "hyper")]
pub use transport::HyperTransport;
pub use transport::{ReqwestTransport, Transport};
pub use types::{BufferedRequest, Request, Response};

pub use http::{header, HeaderMap, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, HttpError>;
