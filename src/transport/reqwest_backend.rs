use std::fmt;

use async_trait::async_trait;

use crate::{BufferedRequest, HttpError, Response, Result, Transport, TransportError};

/// General-purpose backend over a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| HttpError::Build(format!("reqwest client: {err}")))?;
        Ok(Self { http })
    }

    /// Wraps an existing client, keeping its TLS, proxy and pool settings.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &mut BufferedRequest,
    ) -> std::result::Result<Response, TransportError> {
        let mut builder = self
            .http
            .request(request.method().clone(), request.url().clone())
            .headers(request.wire_headers());
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body_mut() {
            builder = builder.body(body.take_remaining());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response::new(status).with_headers(headers).with_body(body))
    }
}
