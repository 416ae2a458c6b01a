//! HTTP/JSON surface (spec §6). Enriched from the pack's REST crate shape —
//! the teacher has no HTTP layer of its own to generalize — adapted to the
//! colon-suffixed `:predict` verb TensorFlow Serving's REST API uses, which
//! doesn't fit a plain path-segment router and is split out by hand.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::{
    error::{Error, ErrorCode},
    mediator::RequestMediator,
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.code() {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::LoadFailed
            | ErrorCode::UnloadPending
            | ErrorCode::IoError
            | ErrorCode::Internal
            | ErrorCode::Ok => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.message()}))).into_response()
    }
}

fn invalid_json_response() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid JSON in request body"}))).into_response()
}

fn unknown_action_response(model_segment: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("unrecognized request path for '{model_segment}'")})),
    )
        .into_response()
}

/// Splits a `{name}:{verb}` path segment, as TF Serving's REST API packs the
/// action into the final path segment rather than a distinct one.
fn split_colon_suffix(segment: &str) -> Option<(&str, &str)> {
    segment.split_once(':')
}

pub fn build_router(mediator: Arc<RequestMediator>) -> Router {
    Router::new()
        .route("/v1/models/:segment", get(get_status).post(post_predict))
        .route(
            "/v1/models/:model/versions/:segment",
            get(get_status_version).post(post_predict_version),
        )
        .route("/v1/models/:model/metadata", get(get_metadata))
        .route("/v1/models/:model/versions/:version/metadata", get(get_metadata_version))
        .layer(TraceLayer::new_for_http())
        .with_state(mediator)
}

async fn get_status(State(mediator): State<Arc<RequestMediator>>, Path(segment): Path<String>) -> Response {
    status_response(mediator.get_model_status(&segment, None).await)
}

async fn post_predict(
    State(mediator): State<Arc<RequestMediator>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Response {
    match split_colon_suffix(&segment) {
        Some((model, "predict")) => predict_response(&mediator, model, None, body).await,
        _ => unknown_action_response(&segment),
    }
}

async fn get_status_version(
    State(mediator): State<Arc<RequestMediator>>,
    Path((model, segment)): Path<(String, String)>,
) -> Response {
    match segment.parse::<u64>() {
        Ok(version) => status_response(mediator.get_model_status(&model, Some(version)).await),
        Err(_) => unknown_action_response(&segment),
    }
}

async fn post_predict_version(
    State(mediator): State<Arc<RequestMediator>>,
    Path((model, segment)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    match split_colon_suffix(&segment) {
        Some((version_str, "predict")) => match version_str.parse::<u64>() {
            Ok(version) => predict_response(&mediator, &model, Some(version), body).await,
            Err(_) => unknown_action_response(&segment),
        },
        _ => unknown_action_response(&segment),
    }
}

async fn get_metadata(State(mediator): State<Arc<RequestMediator>>, Path(model): Path<String>) -> Response {
    metadata_response(mediator.get_model_metadata(&model, None).await)
}

async fn get_metadata_version(
    State(mediator): State<Arc<RequestMediator>>,
    Path((model, version)): Path<(String, u64)>,
) -> Response {
    metadata_response(mediator.get_model_metadata(&model, Some(version)).await)
}

async fn predict_response(
    mediator: &RequestMediator,
    model: &str,
    version: Option<u64>,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return invalid_json_response(),
    };
    match mediator.predict(model, version, payload, None).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn status_response(result: Result<Vec<crate::version::VersionStatus>, Error>) -> Response {
    match result {
        Ok(statuses) => (StatusCode::OK, Json(statuses)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn metadata_response(result: Result<crate::mediator::ModelMetadataResponse, Error>) -> Response {
    match result {
        Ok(metadata) => (StatusCode::OK, Json(metadata)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{EngineLoader, InferenceRuntime},
        manager::ModelManager,
        policy::PolicyConfig,
        storage::LocalFilesystemStorage,
        tensor::{ModelKeys, NamedTensors, TensorDescriptor},
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::{collections::HashMap, path::Path as StdPath, path::PathBuf};
    use tower::ServiceExt;

    struct StubRuntime;

    #[async_trait]
    impl InferenceRuntime for StubRuntime {
        fn input_tensors(&self) -> &HashMap<String, TensorDescriptor> {
            static EMPTY: std::sync::OnceLock<HashMap<String, TensorDescriptor>> = std::sync::OnceLock::new();
            EMPTY.get_or_init(HashMap::new)
        }
        fn output_tensors(&self) -> &HashMap<String, TensorDescriptor> {
            self.input_tensors()
        }
        fn model_keys(&self) -> &ModelKeys {
            static KEYS: std::sync::OnceLock<ModelKeys> = std::sync::OnceLock::new();
            KEYS.get_or_init(ModelKeys::default)
        }
        async fn infer(&self, named_tensors: NamedTensors, _batch_size: usize) -> Result<NamedTensors, Error> {
            Ok(named_tensors)
        }
    }

    struct StubLoader;

    #[async_trait]
    impl EngineLoader for StubLoader {
        async fn load(&self, _dir: &StdPath) -> Result<Box<dyn InferenceRuntime>, Error> {
            Ok(Box::new(StubRuntime))
        }
    }

    async fn router_with_resnet_v1() -> Router {
        let manager = ModelManager::new(
            "resnet",
            PathBuf::from("/models/resnet"),
            PolicyConfig::Latest(1),
            Arc::new(LocalFilesystemStorage::new()),
            Arc::new(StubLoader),
        );
        manager.handle_repository_event([1].into_iter().collect()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        build_router(Arc::new(RequestMediator::new([manager])))
    }

    #[tokio::test]
    async fn status_for_known_model_is_200() {
        let router = router_with_resnet_v1().await;
        let response = router
            .oneshot(Request::get("/v1/models/resnet").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_for_unknown_model_is_404_with_error_body() {
        let router = router_with_resnet_v1().await;
        let response = router
            .oneshot(Request::get("/v1/models/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value.get("error").is_some());
    }

    #[tokio::test]
    async fn predict_on_missing_version_is_404() {
        let router = router_with_resnet_v1().await;
        let response = router
            .oneshot(
                Request::post("/v1/models/resnet/versions/99:predict")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"inputs\": [1.0]}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn predict_malformed_json_is_400() {
        let router = router_with_resnet_v1().await;
        let response = router
            .oneshot(
                Request::post("/v1/models/resnet:predict")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
