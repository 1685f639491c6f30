use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::{Body, HttpError, ReplayBody, Result};

/// One logical HTTP call, as built by the caller.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
    timeout: Option<Duration>,
    close_connection: Option<bool>,
}

impl Request {
    /// Creates a request, validating the URL.
    pub fn new(method: Method, url: impl AsRef<str>) -> Result<Self> {
        let url = parse_url(url.as_ref())?;
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            close_connection: None,
        })
    }

    /// Creates a request from a textual method such as `"PROPFIND"`.
    pub fn parse(method: &str, url: impl AsRef<str>) -> Result<Self> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|err| HttpError::InvalidRequest(format!("invalid method '{method}': {err}")))?;
        Self::new(method, url)
    }

    /// Merges `headers` into this request, appending to existing names.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut current: Option<HeaderName> = None;
        for (name, value) in headers {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Appends a header given as text.
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| HttpError::InvalidRequest(format!("invalid header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| HttpError::InvalidRequest(format!("invalid value for header '{name}': {err}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Sets `Authorization: Bearer <token>`.
    ///
    /// If the token already carries the `Bearer ` prefix it is kept as is.
    pub fn bearer_auth(mut self, token: impl AsRef<str>) -> Result<Self> {
        let authorization = bearer_value(token.as_ref());
        let mut value = HeaderValue::from_str(&authorization)
            .map_err(|err| HttpError::InvalidRequest(format!("invalid bearer token: {err}")))?;
        value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Per-attempt timeout; overrides the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the client's `close_connection` default for this request.
    pub fn close_connection(mut self, close: bool) -> Self {
        self.close_connection = Some(close);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Snapshots the body so it can be resent on every attempt.
    pub(crate) async fn into_buffered(
        self,
        default_timeout: Option<Duration>,
        default_close: bool,
    ) -> Result<BufferedRequest> {
        let body = match self.body {
            Some(body) => Some(body.into_replay().await.map_err(HttpError::Body)?),
            None => None,
        };
        Ok(BufferedRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body,
            timeout: self.timeout.or(default_timeout),
            close_connection: self.close_connection.unwrap_or(default_close),
        })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &RedactedHeaders(&self.headers))
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A request whose body has been snapshotted for replay.
///
/// Transports receive it mutably so they can consume the body; interceptors
/// only ever see it by shared reference.
pub struct BufferedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<ReplayBody>,
    timeout: Option<Duration>,
    close_connection: bool,
}

impl BufferedRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&ReplayBody> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut ReplayBody> {
        self.body.as_mut()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    /// Headers to put on the wire, including `Connection: close` when requested.
    pub fn wire_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if self.close_connection {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        headers
    }

    pub(crate) fn rewind_body(&mut self) {
        if let Some(body) = self.body.as_mut() {
            body.rewind();
        }
    }
}

impl fmt::Debug for BufferedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &RedactedHeaders(&self.headers))
            .field("body_len", &self.body.as_ref().map(ReplayBody::len))
            .field("timeout", &self.timeout)
            .field("close_connection", &self.close_connection)
            .finish()
    }
}

/// A fully read HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Status ≥ 500; such responses are retried but never turned into errors.
    pub fn is_server_error(&self) -> bool {
        self.status.as_u16() >= 500
    }

    /// Body as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            HttpError::Decode(format!(
                "invalid JSON response: {err}; body: {}",
                self.text()
            ))
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| HttpError::InvalidRequest(format!("invalid url '{raw}': {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(HttpError::InvalidRequest(format!(
            "unsupported url scheme '{other}' in '{raw}'"
        ))),
    }
}

fn bearer_value(token: &str) -> String {
    let token = token.trim();
    match token.split_once(' ') {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => token.to_owned(),
        _ => format!("Bearer {token}"),
    }
}

struct RedactedHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.0 {
            let redact = value.is_sensitive()
                || name == header::AUTHORIZATION
                || name == header::PROXY_AUTHORIZATION
                || name == header::COOKIE;
            if redact {
                map.entry(name, &"<redacted>");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, StatusCode};

    use super::{Request, Response};
    use crate::HttpError;

    fn authorization_for(token: &str) -> String {
        let request = Request::new(Method::GET, "https://api.example.com/items")
            .and_then(|r| r.bearer_auth(token))
            .expect("request must build");
        let value = request
            .header_map()
            .get(http::header::AUTHORIZATION)
            .expect("authorization header must be set");
        assert!(value.is_sensitive());
        value.to_str().expect("ascii token").to_owned()
    }

    #[test]
    fn bearer_auth_prefixes_bare_tokens() {
        assert_eq!(authorization_for("  tok-42 "), "Bearer tok-42");
    }

    #[test]
    fn bearer_auth_keeps_a_caller_supplied_scheme() {
        assert_eq!(authorization_for("bEaReR tok-42"), "bEaReR tok-42");
        assert_eq!(authorization_for("Bearertok"), "Bearer Bearertok");
    }

    #[test]
    fn bearer_auth_rejects_control_characters() {
        let err = Request::new(Method::GET, "https://api.example.com/items")
            .and_then(|r| r.bearer_auth("tok\n42"))
            .expect_err("newline must be rejected");
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let request = Request::new(Method::GET, "https://api.example.com/items")
            .and_then(|r| r.bearer_auth("secret-token"))
            .expect("request must build");
        let debug = format!("{request:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn malformed_url_and_method_are_rejected() {
        let err = Request::new(Method::GET, "not a url").expect_err("url must fail");
        assert!(matches!(err, HttpError::InvalidRequest(_)));

        let err = Request::new(Method::GET, "ftp://example.com/file").expect_err("scheme must fail");
        assert!(matches!(err, HttpError::InvalidRequest(msg) if msg.contains("ftp")));

        let err = Request::parse("GE T", "http://example.com").expect_err("method must fail");
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }

    #[test]
    fn merged_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", "a".parse().expect("header value"));
        headers.append("x-tag", "b".parse().expect("header value"));
        let request = Request::new(Method::GET, "http://example.com")
            .expect("request must build")
            .headers(headers);
        let values: Vec<_> = request.header_map().get_all("X-Tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn buffering_applies_defaults_unless_overridden() {
        let request = Request::new(Method::POST, "http://example.com")
            .expect("request must build")
            .body("payload")
            .close_connection(true);
        let buffered = request
            .into_buffered(Some(std::time::Duration::from_secs(5)), false)
            .await
            .expect("buffering must succeed");
        assert_eq!(buffered.timeout(), Some(std::time::Duration::from_secs(5)));
        assert!(buffered.close_connection());
        assert_eq!(buffered.wire_headers()["connection"], "close");
        assert_eq!(buffered.body().map(|b| b.remaining()), Some(&b"payload"[..]));
    }

    #[test]
    fn server_error_threshold_is_500() {
        assert!(!Response::new(StatusCode::from_u16(499).expect("status")).is_server_error());
        assert!(Response::new(StatusCode::INTERNAL_SERVER_ERROR).is_server_error());
        assert!(Response::new(StatusCode::from_u16(599).expect("status")).is_server_error());
    }

    #[test]
    fn json_decodes_body() {
        let response = Response::new(StatusCode::OK).with_body(r#"{"id": 7}"#);
        let value: serde_json::Value = response.json().expect("json must decode");
        assert_eq!(value["id"], 7);
        assert!(matches!(
            Response::new(StatusCode::OK).with_body("nope").json::<serde_json::Value>(),
            Err(HttpError::Decode(_))
        ));
    }
}
