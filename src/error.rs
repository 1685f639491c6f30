use std::time::Duration;

use crate::Response;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request could not be built (bad URL, method or header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Reading a streamed request body into memory failed.
    #[error("failed to buffer request body: {0}")]
    Body(#[source] std::io::Error),
    /// Every attempt that failed at the transport level, in order.
    ///
    /// `last_response` holds the final 5xx response when the loop ended on one.
    #[error("{}", join_messages(.errors))]
    RetriesExhausted {
        errors: Vec<TransportError>,
        last_response: Option<Box<Response>>,
    },
    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
    /// The whole call, retries and backoff included, ran past its deadline.
    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    /// A transport backend could not be constructed.
    #[error("failed to build transport: {0}")]
    Build(String),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Environment or file configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HttpError {
    /// Transport errors recorded across attempts, if any.
    pub fn transport_errors(&self) -> &[TransportError] {
        match self {
            HttpError::RetriesExhausted { errors, .. } => errors,
            _ => &[],
        }
    }

    /// The last response obtained before giving up, if any.
    pub fn last_response(&self) -> Option<&Response> {
        match self {
            HttpError::RetriesExhausted { last_response, .. } => last_response.as_deref(),
            _ => None,
        }
    }
}

fn join_messages(errors: &[TransportError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Broad category of a transport failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// The per-attempt timeout elapsed.
    Timeout,
    /// No connection could be established.
    Connect,
    /// The request could not be built or written.
    Request,
    /// The response body could not be read.
    Body,
    Other,
}

/// A single failed send, as reported by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}
