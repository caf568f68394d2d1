use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::routing::{Mapping, MappingEntry, RoutingError, RoutingTable};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub mappings: usize,
    pub routing_version: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MappingRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub ingress: String,
    pub egress: String,
}

/// Routing errors as admin API responses.
pub struct AdminError(RoutingError);

impl From<RoutingError> for AdminError {
    fn from(e: RoutingError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            RoutingError::DuplicateId(_) => (StatusCode::CONFLICT, "duplicate_id"),
            RoutingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RoutingError::InvalidPattern { .. } => (StatusCode::BAD_REQUEST, "invalid_pattern"),
        };
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "type": kind,
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub async fn get_status(State(routing): State<Arc<RoutingTable>>) -> Json<SystemStatus> {
    let snapshot = routing.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        mappings: snapshot.len(),
        routing_version: snapshot.version(),
    })
}

pub async fn list_mappings(State(routing): State<Arc<RoutingTable>>) -> Json<Vec<MappingEntry>> {
    Json(routing.list())
}

pub async fn add_mapping(
    State(routing): State<Arc<RoutingTable>>,
    Json(request): Json<MappingRequest>,
) -> Result<(StatusCode, Json<MappingEntry>), AdminError> {
    let mapping = Mapping::new(request.id, request.ingress, request.egress)?;
    let entry = routing.add(mapping)?;
    tracing::info!(id = %entry.id, ingress = %entry.ingress, egress = %entry.egress, "Mapping added");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// The id in the path wins over any id in the body.
pub async fn update_mapping(
    State(routing): State<Arc<RoutingTable>>,
    Path(id): Path<String>,
    Json(request): Json<MappingRequest>,
) -> Result<Json<MappingEntry>, AdminError> {
    let entry = routing.update(&id, &request.ingress, &request.egress)?;
    tracing::info!(id = %entry.id, ingress = %entry.ingress, egress = %entry.egress, "Mapping updated");
    Ok(Json(entry))
}

pub async fn delete_mapping(
    State(routing): State<Arc<RoutingTable>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    routing.delete(&id)?;
    tracing::info!(id = %id, "Mapping deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::admin::router;

    async fn call(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_mapping_crud() {
        let routing = Arc::new(RoutingTable::default());
        let app = router(routing.clone());

        let (status, created) = call(
            &app,
            "POST",
            "/admin/mappings",
            Some(json!({ "id": "dogs", "ingress": "http://gw/dogs(.*)", "egress": "http://b/dogs$1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], "dogs");

        let (status, generated) = call(
            &app,
            "POST",
            "/admin/mappings",
            Some(json!({ "ingress": "http://gw/(.*)", "egress": "http://c/$1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(generated["id"].as_str().is_some_and(|id| !id.is_empty()));

        let (status, listed) = call(&app, "GET", "/admin/mappings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 2);
        assert_eq!(listed[0]["id"], "dogs");

        let (status, updated) = call(
            &app,
            "PUT",
            "/admin/mappings/dogs",
            Some(json!({ "ingress": "http://gw/dogs", "egress": "http://b2/dogs" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["egress"], "http://b2/dogs");
        assert_eq!(routing.resolve_egress("http://gw/dogs").as_deref(), Some("http://b2/dogs"));

        let (status, _) = call(&app, "DELETE", "/admin/mappings/dogs", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "GET", "/admin/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mappings"], 1);
        assert_eq!(body["routing_version"], 4);
    }

    #[tokio::test]
    async fn test_mapping_errors() {
        let app = router(Arc::new(RoutingTable::default()));
        let mapping = json!({ "id": "a", "ingress": "/a", "egress": "http://a" });

        call(&app, "POST", "/admin/mappings", Some(mapping.clone())).await;
        let (status, body) = call(&app, "POST", "/admin/mappings", Some(mapping)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "duplicate_id");

        let (status, _) = call(
            &app,
            "POST",
            "/admin/mappings",
            Some(json!({ "ingress": "(", "egress": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "PUT",
            "/admin/mappings/missing",
            Some(json!({ "ingress": "/x", "egress": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "DELETE", "/admin/mappings/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
