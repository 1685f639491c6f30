//! The single "send one request" capability the executor is written against.

mod reqwest_backend;
#[cfg(feature = "hyper")]
mod hyper_backend;

use async_trait::async_trait;

use crate::{BufferedRequest, Response, TransportError};

#[cfg(feature = "hyper")]
pub use hyper_backend::HyperTransport;
pub use reqwest_backend::ReqwestTransport;

/// Sends one physical attempt of a request.
///
/// Implementations must be safe to share between concurrent callers; pooling
/// and its synchronization are the implementation's business. The request body,
/// if any, is positioned at offset 0 on entry and may be consumed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one exchange. Any failure to obtain a complete response,
    /// including a per-attempt timeout, is a [`TransportError`].
    async fn send(&self, request: &mut BufferedRequest) -> Result<Response, TransportError>;
}
