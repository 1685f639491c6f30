//! Request bodies and their replayable in-memory snapshot.
//!
//! A [`Body`] is what callers hand to the client. Before the first attempt the
//! executor turns it into a [`ReplayBody`], which owns the full byte sequence and
//! can be rewound to offset 0 any number of times.

use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

enum Inner {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

/// A finite request body.
pub struct Body {
    inner: Inner,
}

impl Body {
    /// A zero-length body.
    pub fn empty() -> Self {
        Self::from(Bytes::new())
    }

    /// Wraps a reader that is read to the end once, before the first send.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: Inner::Reader(Box::new(reader)),
        }
    }

    /// Byte length, when it is known without reading.
    pub fn size_hint(&self) -> Option<usize> {
        match &self.inner {
            Inner::Bytes(bytes) => Some(bytes.len()),
            Inner::Reader(_) => None,
        }
    }

    pub(crate) async fn into_replay(self) -> io::Result<ReplayBody> {
        let data = match self.inner {
            Inner::Bytes(bytes) => bytes,
            Inner::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };
        Ok(ReplayBody::new(data))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Bytes(bytes) => f.debug_tuple("Body").field(&bytes.len()).finish(),
            Inner::Reader(_) => f.debug_tuple("Body").field(&"<reader>").finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            inner: Inner::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(bytes))
    }
}

/// Owned body snapshot with an explicit read position.
///
/// Transports consume it through [`take_remaining`](Self::take_remaining) or
/// [`io::Read`]; the executor calls [`rewind`](Self::rewind) before every attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayBody {
    data: Bytes,
    pos: usize,
}

impl ReplayBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Moves the read position back to offset 0.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Returns the unread bytes and moves the position to the end.
    pub fn take_remaining(&mut self) -> Bytes {
        let rest = self.data.slice(self.pos..);
        self.pos = self.data.len();
        rest
    }
}

impl io::Read for ReplayBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = self.remaining();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}
