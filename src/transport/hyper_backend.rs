use std::error::Error as _;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;

use crate::{BufferedRequest, ReplayBody, Response, Transport, TransportError, TransportErrorKind};

/// High-throughput backend over the pooled `hyper-util` client.
///
/// [`HyperTransport::http`] speaks plain HTTP/1. Bring a TLS-capable connector
/// through [`HyperTransport::from_client`].
#[derive(Clone)]
pub struct HyperTransport<C = HttpConnector> {
    client: HyperClient<C, Full<Bytes>>,
}

impl<C> fmt::Debug for HyperTransport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport<HttpConnector> {
    /// Plain HTTP/1 client with the default connection pool.
    pub fn http() -> Self {
        let client = HyperClient::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl<C> HyperTransport<C> {
    /// Wraps a prebuilt client, e.g. one with a TLS connector.
    pub fn from_client(client: HyperClient<C, Full<Bytes>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> Transport for HyperTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn send(&self, request: &mut BufferedRequest) -> Result<Response, TransportError> {
        let uri = request.url().as_str().parse::<Uri>().map_err(|err| {
            TransportError::new(
                TransportErrorKind::Request,
                format!("invalid uri '{}'", request.url()),
            )
            .with_source(err)
        })?;
        let body = request
            .body_mut()
            .map(ReplayBody::take_remaining)
            .unwrap_or_default();

        let mut builder = http::Request::builder()
            .method(request.method().clone())
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.wire_headers();
        }
        let outgoing = builder.body(Full::new(body)).map_err(|err| {
            TransportError::new(TransportErrorKind::Request, format!("invalid request: {err}"))
        })?;

        let exchange = async {
            let response: hyper::Response<Incoming> =
                self.client.request(outgoing).await.map_err(classify)?;
            let (parts, incoming) = response.into_parts();
            let body = incoming
                .collect()
                .await
                .map_err(|err: hyper::Error| {
                    TransportError::new(
                        TransportErrorKind::Body,
                        format!("error reading response body: {err}"),
                    )
                    .with_source(err)
                })?
                .to_bytes();
            Ok::<_, TransportError>(
                Response::new(parts.status)
                    .with_headers(parts.headers)
                    .with_body(body),
            )
        };

        match request.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| TransportError::timeout(format!("request timed out after {timeout:?}")))?,
            None => exchange.await,
        }
    }
}

fn classify(err: hyper_util::client::legacy::Error) -> TransportError {
    let kind = if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Request
    };
    let message = match err.source() {
        Some(cause) => format!("{err}: {cause}"),
        None => err.to_string(),
    };
    TransportError::new(kind, message).with_source(err)
}
