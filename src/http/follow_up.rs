//! Follow-up fetch orchestration.
//!
//! Turns the follow-up tasks of a projection into the ordered part stream of a
//! multipart response.
//!
//! # Data Flow
//! ```text
//! tasks [t1, t2, ...]
//!     → buffered(n): fetch + project up to n tasks at once, yield in task order
//!     → flat_map: part(t1), parts(t1's nested tasks), part(t2), ...
//! ```
//!
//! # Design Decisions
//! - Output order is discovery order regardless of completion order
//! - Each level owns its stream; nothing is shared between levels except the
//!   read-only context
//! - The stream owns every in-flight fetch: dropping it cancels them
//! - The first failure ends the stream

use std::future::ready;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{self, HeaderMap};
use axum::http::Method;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use url::Url;

use crate::http::error::{GatewayError, UpstreamError};
use crate::http::request::{build_request, strip_hop_by_hop};
use crate::http::upstream::UpstreamClient;
use crate::multipart::Part;
use crate::observability::metrics;
use crate::query::{project_follow_up, FollowUpTask};
use crate::routing::RoutingTable;

/// Per-request state shared by every follow-up fetch.
pub struct FollowUpContext {
    pub client: UpstreamClient,
    pub routing: Arc<RoutingTable>,
    /// Ingress URI of the primary request; relative links resolve against it.
    pub base: Url,
    /// Forwarded headers for follow-up GETs. `Host` is set per fetch.
    pub headers: HeaderMap,
    pub concurrency: usize,
    pub request_id: String,
}

/// Parts for `tasks` and, depth-first, for the tasks they discover.
pub fn follow_up_parts(
    ctx: Arc<FollowUpContext>,
    tasks: Vec<FollowUpTask>,
) -> BoxStream<'static, Result<Part, GatewayError>> {
    let concurrency = ctx.concurrency.max(1);
    stream::iter(tasks)
        .map(move |task| {
            let ctx = ctx.clone();
            async move {
                let resolved = resolve(&ctx, task).await;
                (ctx, resolved)
            }
        })
        .buffered(concurrency)
        .flat_map(|(ctx, resolved)| match resolved {
            Ok((part, nested)) if nested.is_empty() => stream::once(ready(Ok(part))).boxed(),
            Ok((part, nested)) => stream::once(ready(Ok(part)))
                .chain(follow_up_parts(ctx, nested))
                .boxed(),
            Err(e) => stream::once(ready(Err(e))).boxed(),
        })
        .scan(false, |failed, item| {
            if *failed {
                return ready(None);
            }
            *failed = item.is_err();
            ready(Some(item))
        })
        .boxed()
}

/// Fetch one task's document and project it.
async fn resolve(
    ctx: &FollowUpContext,
    task: FollowUpTask,
) -> Result<(Part, Vec<FollowUpTask>), GatewayError> {
    let result = fetch_and_project(ctx, &task).await;
    metrics::record_follow_up(if result.is_ok() { "ok" } else { "error" });
    if let Err(e) = &result {
        tracing::warn!(
            request_id = %ctx.request_id,
            url = %task.url,
            error = %e,
            "Follow-up failed"
        );
    }
    result
}

async fn fetch_and_project(
    ctx: &FollowUpContext,
    task: &FollowUpTask,
) -> Result<(Part, Vec<FollowUpTask>), GatewayError> {
    let resolved = ctx
        .base
        .join(&task.url)
        .map_err(|e| UpstreamError::InvalidUrl {
            url: task.url.clone(),
            reason: e.to_string(),
        })?;

    let egress = match ctx.routing.resolve_egress(resolved.as_str()) {
        Some(egress) => egress,
        None => {
            tracing::warn!(
                request_id = %ctx.request_id,
                url = %resolved,
                "No mapping for follow-up URL, fetching it directly"
            );
            resolved.to_string()
        }
    };

    tracing::debug!(
        request_id = %ctx.request_id,
        url = %resolved,
        egress = %egress,
        "Fetching follow-up"
    );

    let request = build_request(Method::GET, &egress, ctx.headers.clone(), Body::empty())?;
    let response = ctx.client.fetch(request).await?;
    let (parts, body) = response.into_parts();
    let source = ctx.client.read_json(&egress, body).await?;

    let projection = project_follow_up(&source, task)?;
    let part = Part::new(part_headers(&parts.headers), projection.target.to_string());
    Ok((part, projection.follow_ups))
}

/// Headers for a part built from a backend response.
///
/// The content is re-serialized, so length and encoding no longer apply.
pub fn part_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut headers = headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);

    let mut out: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    if !headers.contains_key(header::CONTENT_TYPE) {
        out.push((
            header::CONTENT_TYPE.as_str().to_string(),
            "application/json".to_string(),
        ));
    }
    out
}
