//! Streaming multipart/mixed encoder.
//!
//! Wraps a stream of [`Part`]s and yields the framed body one part at a time.
//! The next part is only pulled when the consumer polls, so a slow client
//! holds back the producers. Dropping the encoder drops the inner stream and
//! everything it still buffers.
//!
//! # Framing
//! ```text
//! --<boundary>\r\n
//! <name>: <value>\r\n        (per header, in order)
//! \r\n
//! <content>\r\n
//! ... repeated per part ...
//! --<boundary>--\r\n
//! ```

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::multipart::part::Part;

const BOUNDARY_LEN: usize = 32;
const CRLF: &[u8] = b"\r\n";

/// Per-response boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes a stream of parts into a multipart/mixed byte stream.
pub struct MultipartEncoder<E> {
    parts: Pin<Box<dyn Stream<Item = Result<Part, E>> + Send>>,
    boundary: Boundary,
    in_part: bool,
    is_terminated: bool,
}

impl<E> MultipartEncoder<E> {
    pub fn new<S>(parts: S) -> Self
    where
        S: Stream<Item = Result<Part, E>> + Send + 'static,
    {
        Self::with_boundary(parts, Boundary::generate())
    }

    pub fn with_boundary<S>(parts: S, boundary: Boundary) -> Self
    where
        S: Stream<Item = Result<Part, E>> + Send + 'static,
    {
        Self {
            parts: Box::pin(parts),
            boundary,
            in_part: false,
            is_terminated: false,
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// `Content-Type` value announcing this encoder's boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    fn encode(&mut self, part: Part) -> Bytes {
        let mut buf = BytesMut::with_capacity(part.content().len() + 128);

        if !self.in_part {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_str().as_bytes());
            buf.put_slice(CRLF);
            for (name, value) in part.headers() {
                buf.put_slice(name.as_bytes());
                buf.put_slice(b": ");
                buf.put_slice(value.as_bytes());
                buf.put_slice(CRLF);
            }
            buf.put_slice(CRLF);
        }

        buf.put_slice(part.content());

        if part.is_last() {
            buf.put_slice(CRLF);
            self.in_part = false;
        } else {
            self.in_part = true;
        }
        buf.freeze()
    }

    fn closing(&mut self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.boundary.as_str().len() + 8);
        if self.in_part {
            buf.put_slice(CRLF);
            self.in_part = false;
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_str().as_bytes());
        buf.put_slice(b"--");
        buf.put_slice(CRLF);
        buf.freeze()
    }
}

impl<E> Stream for MultipartEncoder<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_terminated {
            return Poll::Ready(None);
        }
        match self.parts.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(part))) => {
                let chunk = self.encode(part);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                // No closing line: the body must not look complete.
                self.is_terminated = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.is_terminated = true;
                let closing = self.closing();
                Poll::Ready(Some(Ok(closing)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
