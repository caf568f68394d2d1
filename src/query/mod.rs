//! Query language subsystem.
//!
//! # Data Flow
//! ```text
//! query text
//!     → parser.rs (apollo-parser CST → owned Document)
//!     → projector.rs (Document × JSON → filtered JSON + follow-up tasks)
//!         → template.rs (expand `{name}` placeholders in @GET links)
//!
//! follow-up task + fetched JSON
//!     → projector.rs (re-enter with the task's fragment)
//! ```
//!
//! # Design Decisions
//! - No schema: fragment applicability is a discriminator heuristic
//! - Only `@GET` is interpreted; unknown directives are ignored
//! - Every error aborts the pass; no partial documents

pub mod document;
pub mod parser;
pub mod projector;
pub mod template;

pub use document::Document;
pub use parser::{parse_document, ParseError};
pub use projector::{
    project, project_follow_up, DirectiveError, FollowUpTask, Projection, ProjectionError,
    RootOperation,
};
