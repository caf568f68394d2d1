//! multipart/mixed response encoding.
//!
//! # Responsibilities
//! - Represent a part as ordered headers plus content
//! - Frame a stream of parts under a per-response boundary
//!
//! # Design Decisions
//! - Pull-based: the encoder polls its source only when the body is polled
//! - A source error ends the stream without the closing boundary line

pub mod encoder;
pub mod part;

pub use encoder::{Boundary, MultipartEncoder};
pub use part::Part;
