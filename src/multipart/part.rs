//! A single part of a multipart/mixed body.

use bytes::Bytes;

/// One chunk of a part: headers, content and whether the part ends here.
///
/// Headers are kept as ordered `(name, value)` pairs and written verbatim.
/// Only the first chunk of a part has its headers written; the parts produced
/// by the gateway are always a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    headers: Vec<(String, String)>,
    content: Bytes,
    is_last: bool,
}

impl Part {
    /// A complete, single-chunk part.
    pub fn new(headers: Vec<(String, String)>, content: impl Into<Bytes>) -> Self {
        Self::chunk(headers, content, true)
    }

    pub fn chunk(headers: Vec<(String, String)>, content: impl Into<Bytes>, is_last: bool) -> Self {
        Self {
            headers,
            content: content.into(),
            is_last,
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }
}
