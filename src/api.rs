use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::services::StorageError;

/// JSON error body returned by every API route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                retryable,
            },
        }
    }
}

impl From<&AnalysisError> for ErrorBody {
    fn from(err: &AnalysisError) -> Self {
        ErrorBody::new(err.kind(), err.user_message(), err.is_retryable())
    }
}

/// Query string for `GET /api/brews`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// HTTP status for an analysis failure
pub fn status_code(err: &AnalysisError) -> u16 {
    match err {
        AnalysisError::InvalidRequest(_) => 400,
        AnalysisError::UpstreamImage(StorageError::ObjectNotFound(_)) => 404,
        AnalysisError::UpstreamImage(_) => 502,
        AnalysisError::MissingConfiguration(_) | AnalysisError::Encoding(_) => 500,
        AnalysisError::ModelUnavailable(_) => 503,
        AnalysisError::Timeout { .. } => 504,
        AnalysisError::ModelResponseMalformed(_)
        | AnalysisError::ModelOutputNotJson(_)
        | AnalysisError::ModelOutputSchemaViolation { .. }
        | AnalysisError::ModelOutputTruncated => 502,
    }
}

// Axum integration
#[cfg(feature = "http-server")]
pub mod server {
    use super::*;
    use axum::{
        extract::{
            rejection::{JsonRejection, PathRejection, QueryRejection},
            Path, Query, State,
        },
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::Arc;
    use tower::ServiceBuilder;
    use tower_http::limit::RequestBodyLimitLayer;

    use crate::handlers::{BrewAnalyzer, BrewLogError, BrewLogHandler};
    use crate::models::{AnalysisRequest, AnalysisStatus, NewBrewLog};

    const MAX_BODY_BYTES: usize = 64 * 1024;
    const DEFAULT_LIST_LIMIT: i64 = 50;

    pub struct AppState {
        pub analyzer: Arc<BrewAnalyzer>,
        pub brew_logs: Option<Arc<BrewLogHandler>>,
    }

    fn error_response(status: StatusCode, body: ErrorBody) -> Response {
        (status, Json(body)).into_response()
    }

    impl IntoResponse for AnalysisError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(status_code(&self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                log::error!("❌ Analysis failed: {} ({})", self.kind(), self);
            } else {
                log::warn!("⚠️ Analysis rejected: {} ({})", self.kind(), self);
            }
            error_response(status, ErrorBody::from(&self))
        }
    }

    impl IntoResponse for BrewLogError {
        fn into_response(self) -> Response {
            match self {
                BrewLogError::Analysis(err) => err.into_response(),
                BrewLogError::NotFound(id) => error_response(
                    StatusCode::NOT_FOUND,
                    ErrorBody::new("NotFound", format!("Brew log {} not found", id), false),
                ),
                BrewLogError::Invalid(msg) => {
                    error_response(StatusCode::BAD_REQUEST, ErrorBody::new("InvalidRequest", msg, false))
                }
                BrewLogError::Database(err) => {
                    log::error!("❌ Database error: {}", err);
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorBody::new("InternalError", "Something went wrong. Please try again.", true),
                    )
                }
            }
        }
    }

    pub fn create_router(analyzer: Arc<BrewAnalyzer>, brew_logs: Option<Arc<BrewLogHandler>>) -> Router {
        let with_brew_logs = brew_logs.is_some();
        let state = Arc::new(AppState { analyzer, brew_logs });

        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .route("/api/analyze", post(analyze_handler));

        if with_brew_logs {
            router = router
                .route("/api/brews", post(create_brew_log).get(list_brew_logs))
                .route("/api/brews/:id", get(get_brew_log))
                .route("/api/brews/:id/analyze", post(analyze_brew_log));
        }

        router
            .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
            .with_state(state)
    }

    fn invalid_body(rejection: JsonRejection) -> String {
        format!("Invalid request body: {}", rejection.body_text())
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        payload: Result<Json<AnalysisRequest>, JsonRejection>,
    ) -> Result<Json<crate::models::AnalysisResult>, AnalysisError> {
        let Json(request) = payload.map_err(|e| AnalysisError::InvalidRequest(invalid_body(e)))?;
        log::info!("📨 Analyze request: photo={}, method={}", request.photo_key, request.brew_method);
        let result = state.analyzer.analyze(&request).await?;
        Ok(Json(result))
    }

    fn brew_logs(state: &AppState) -> Result<&Arc<BrewLogHandler>, BrewLogError> {
        state
            .brew_logs
            .as_ref()
            .ok_or_else(|| BrewLogError::Database(anyhow::anyhow!("brew log store not configured")))
    }

    async fn create_brew_log(
        State(state): State<Arc<AppState>>,
        payload: Result<Json<NewBrewLog>, JsonRejection>,
    ) -> Result<impl IntoResponse, BrewLogError> {
        let Json(new_log) = payload.map_err(|e| BrewLogError::Invalid(invalid_body(e)))?;
        let log = brew_logs(&state)?.create(&new_log).await?;
        Ok((StatusCode::CREATED, Json(log)))
    }

    async fn list_brew_logs(
        State(state): State<Arc<AppState>>,
        query: Result<Query<ListQuery>, QueryRejection>,
    ) -> Result<impl IntoResponse, BrewLogError> {
        let Query(query) = query.map_err(|e| BrewLogError::Invalid(format!("Invalid query: {}", e.body_text())))?;
        let status = match query.status.as_deref() {
            None => None,
            Some(raw) => Some(
                AnalysisStatus::from_string(raw)
                    .ok_or_else(|| BrewLogError::Invalid(format!("unknown status: {}", raw)))?,
            ),
        };
        let logs = brew_logs(&state)?
            .list(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(Json(logs))
    }

    fn brew_log_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, BrewLogError> {
        id.map(|Path(id)| id)
            .map_err(|e| BrewLogError::Invalid(format!("Invalid brew log id: {}", e.body_text())))
    }

    async fn get_brew_log(
        State(state): State<Arc<AppState>>,
        id: Result<Path<i64>, PathRejection>,
    ) -> Result<impl IntoResponse, BrewLogError> {
        let id = brew_log_id(id)?;
        let log = brew_logs(&state)?.get(id).await?;
        Ok(Json(log))
    }

    async fn analyze_brew_log(
        State(state): State<Arc<AppState>>,
        id: Result<Path<i64>, PathRejection>,
    ) -> Result<impl IntoResponse, BrewLogError> {
        let id = brew_log_id(id)?;
        log::info!("📨 Analyze brew log {}", id);
        let log = brew_logs(&state)?.analyze(id).await?;
        Ok(Json(log))
    }

    async fn root_handler() -> &'static str {
        "Brew Analyzer - POST /api/analyze with {\"photoKey\", \"brewMethod\"}"
    }

    async fn health_check() -> &'static str {
        "OK"
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::handlers::AnalyzerSettings;
        use crate::models::{MediaType, RawImage};
        use crate::services::database::memory::MemoryBrewLogStore;
        use crate::services::{Completion, ImageFetcher, ModelClient, ModelError, ModelImage, StopReason};
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        struct FixedFetcher;

        #[async_trait::async_trait]
        impl ImageFetcher for FixedFetcher {
            async fn fetch(&self, key: &str) -> Result<RawImage, StorageError> {
                if key.contains("missing") {
                    return Err(StorageError::ObjectNotFound(key.to_string()));
                }
                Ok(RawImage::new(vec![0xff, 0xd8, 0xff], MediaType::from_key(key)))
            }
        }

        struct FixedModel(&'static str);

        #[async_trait::async_trait]
        impl ModelClient for FixedModel {
            fn model_id(&self) -> &str {
                "fixed"
            }

            async fn invoke(&self, _image: &ModelImage, _instruction: &str) -> Result<Completion, ModelError> {
                Ok(Completion::new(self.0, StopReason::EndTurn))
            }
        }

        const VALID: &str = r#"Here you go: {"extractionScore":64.5,"visualFeedback":{"colorAnalysis":"pale","patternAnalysis":"two channels","textureNotes":"thin crema"},"channeling":true,"overExtraction":false,"aiSuggestions":"improve puck prep"}"#;

        fn router(reply: &'static str) -> Router {
            let analyzer = BrewAnalyzer::new(
                Arc::new(FixedFetcher),
                Arc::new(FixedModel(reply)),
                AnalyzerSettings::default(),
            );
            create_router(Arc::new(analyzer), None)
        }

        fn analyze_request(body: &str) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        async fn body_json(response: Response) -> serde_json::Value {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }

        #[tokio::test]
        async fn test_health() {
            let response = router(VALID)
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn test_analyze_returns_result() {
            let response = router(VALID)
                .oneshot(analyze_request(r#"{"photoKey":"brew-photos/1-shot.jpg","brewMethod":"espresso"}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["extractionScore"], 64.5);
            assert_eq!(json["channeling"], true);
            assert_eq!(json["visualFeedback"]["patternAnalysis"], "two channels");
        }

        #[tokio::test]
        async fn test_analyze_invalid_request() {
            let response = router(VALID)
                .oneshot(analyze_request(r#"{"photoKey":"","brewMethod":"espresso"}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "InvalidRequest");
            assert_eq!(json["error"]["retryable"], false);
        }

        #[tokio::test]
        async fn test_analyze_missing_photo() {
            let response = router(VALID)
                .oneshot(analyze_request(r#"{"photoKey":"brew-photos/missing.jpg","brewMethod":"espresso"}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "UpstreamImageError");
            assert_eq!(json["error"]["message"], "Unable to load photo");
        }

        #[tokio::test]
        async fn test_analyze_bad_model_output_is_generic_failure() {
            let response = router("I'd rather not.")
                .oneshot(analyze_request(r#"{"photoKey":"brew-photos/1.jpg","brewMethod":"aeropress"}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "ModelOutputNotJSON");
            assert_eq!(json["error"]["message"], "Analysis failed. Please try again.");
        }

        fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        fn router_with_brew_logs(reply: &'static str) -> Router {
            let analyzer = Arc::new(BrewAnalyzer::new(
                Arc::new(FixedFetcher),
                Arc::new(FixedModel(reply)),
                AnalyzerSettings::default(),
            ));
            let brew_logs = BrewLogHandler::new(Arc::new(MemoryBrewLogStore::default()), analyzer.clone());
            create_router(analyzer, Some(Arc::new(brew_logs)))
        }

        #[tokio::test]
        async fn test_analyze_malformed_body_uses_error_contract() {
            let bodies = [
                r#"{"photoKey":"brew-photos/1.jpg"}"#,
                r#"{"brewMethod":"v60"}"#,
                r#"{"photoKey":null,"brewMethod":"v60"}"#,
                r#"{"photoKey":"brew-photos/1.jpg","brewMethod":"#,
            ];

            for body in bodies {
                let response = router(VALID).oneshot(analyze_request(body)).await.unwrap();

                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
                let json = body_json(response).await;
                assert_eq!(json["error"]["code"], "InvalidRequest", "body {}", body);
                assert_eq!(json["error"]["retryable"], false);
                assert!(json["error"]["message"].as_str().unwrap().starts_with("Invalid request body"));
            }
        }

        #[tokio::test]
        async fn test_brew_log_create_and_analyze() {
            let app = router_with_brew_logs(VALID);

            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/brews",
                    r#"{"photoKey":"brew-photos/7.jpg","brewMethod":"espresso","grindSize":"fine"}"#,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let created = body_json(response).await;
            assert_eq!(created["analysisStatus"], "pending");
            let id = created["id"].as_i64().unwrap();

            let response = app
                .clone()
                .oneshot(json_request("POST", &format!("/api/brews/{}/analyze", id), ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let analyzed = body_json(response).await;
            assert_eq!(analyzed["analysisStatus"], "completed");
            assert_eq!(analyzed["extractionScore"], 64.5);

            let response = app
                .oneshot(Request::builder().uri("/api/brews?status=completed").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let listed = body_json(response).await;
            assert_eq!(listed.as_array().map(Vec::len), Some(1));
        }

        #[tokio::test]
        async fn test_brew_log_failed_analysis_returns_error_body() {
            let app = router_with_brew_logs("no json today");
            app.clone()
                .oneshot(json_request("POST", "/api/brews", r#"{"photoKey":"brew-photos/8.jpg","brewMethod":"v60"}"#))
                .await
                .unwrap();

            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/brews/1/analyze", ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            assert_eq!(body_json(response).await["error"]["code"], "ModelOutputNotJSON");

            let response = app
                .oneshot(Request::builder().uri("/api/brews/1").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let stored = body_json(response).await;
            assert_eq!(stored["analysisStatus"], "failed");
            assert_eq!(stored["analysisError"], "ModelOutputNotJSON");
        }

        #[tokio::test]
        async fn test_brew_log_request_errors() {
            let app = router_with_brew_logs(VALID);
            let cases = [
                json_request("POST", "/api/brews", r#"{"brewMethod":"v60"}"#),
                Request::builder().uri("/api/brews?status=brewing").body(Body::empty()).unwrap(),
                Request::builder().uri("/api/brews?limit=many").body(Body::empty()).unwrap(),
                Request::builder().uri("/api/brews/abc").body(Body::empty()).unwrap(),
            ];

            for request in cases {
                let uri = request.uri().to_string();
                let response = app.clone().oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
                assert_eq!(body_json(response).await["error"]["code"], "InvalidRequest", "uri {}", uri);
            }

            let response = app
                .oneshot(Request::builder().uri("/api/brews/99").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await["error"]["code"], "NotFound");
        }

        #[tokio::test]
        async fn test_brew_routes_absent_without_database() {
            let response = router(VALID)
                .oneshot(Request::builder().uri("/api/brews").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
