//! Target handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::SuccessResponse;
use crate::api::ApiState;
use crate::error::AppError;
use crate::models::{Credentials, ValidationResult};

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub username: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl TargetRequest {
    fn credentials(&self) -> Result<Credentials, AppError> {
        Credentials::new(&self.username, self.api_key.as_deref())
    }
}

#[derive(Serialize)]
pub struct ValidateResponse {
    #[serde(flatten)]
    pub result: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// POST /api/validate - Check credentials without registering
pub async fn validate_credentials(
    State(state): State<ApiState>,
    Json(payload): Json<TargetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let credentials = payload.credentials()?;
    let result = state.manager.client().validate(&credentials).await;
    let error = result.error_key();

    Ok(Json(ValidateResponse { result, error }))
}

/// GET /api/targets - List all targets with their poll state
pub async fn list_targets(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.manager.list().await)
}

/// POST /api/targets - Validate and register a target
pub async fn create_target(
    State(state): State<ApiState>,
    Json(payload): Json<TargetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let credentials = payload.credentials()?;
    let entry = state.manager.register(credentials).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/targets/:username - One target
pub async fn get_target(
    State(state): State<ApiState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .manager
        .get(&username)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Target {} not found", username)))?;

    Ok(Json(status))
}

/// GET /api/targets/:username/stats - Flat field map of the last snapshot
pub async fn get_target_stats(
    State(state): State<ApiState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .manager
        .get(&username)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Target {} not found", username)))?;

    Ok(Json(status.state.last_snapshot))
}

/// POST /api/targets/:username/refresh - Poll now
pub async fn refresh_target(
    State(state): State<ApiState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.manager.refresh(&username).await?;
    Ok(Json(SuccessResponse::new("Refresh requested")))
}

/// POST /api/targets/:username/restart - Restart the poll loop
pub async fn restart_target(
    State(state): State<ApiState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.manager.restart(&username).await?;
    Ok(Json(SuccessResponse::new("Poll loop restarted")))
}

/// DELETE /api/targets/:username - Stop polling and forget the target
pub async fn delete_target(
    State(state): State<ApiState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.manager.remove(&username).await?;
    Ok(Json(SuccessResponse::new("Target removed")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::{routes, ApiState};
    use crate::config::ApiConfig;
    use crate::donut::testing::{FakeHttp, Reply};
    use crate::donut::DonutClient;
    use crate::models::Endpoint;
    use crate::poller::PollManager;

    fn test_app(http: FakeHttp) -> (Router, Arc<PollManager>) {
        let client = Arc::new(DonutClient::new(Arc::new(http), &ApiConfig::default()).unwrap());
        let manager = Arc::new(PollManager::new(client, Duration::from_secs(60)));
        let app = routes().with_state(ApiState::new(manager.clone()));
        (app, manager)
    }

    fn ok_http() -> FakeHttp {
        FakeHttp::new()
            .reply(
                Endpoint::Stats,
                Reply::json(200, json!({"status": 200, "result": {"kills": 5}})),
            )
            .reply(Endpoint::Lookup, Reply::json(200, json!({"uuid": "abc-123"})))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (u16, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(ok_http());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["targets"], 0);
    }

    #[tokio::test]
    async fn test_validate_endpoint() {
        let (app, _) = test_app(ok_http());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/validate",
            Some(json!({"username": "Steve", "api_key": "none"})),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["result"], "valid");
        assert_eq!(body["uuid"], "abc-123");
        assert!(body.get("error").is_none());

        let (app, _) = test_app(FakeHttp::new().reply(Endpoint::Lookup, Reply::raw(401, "")));
        let (_, body) = call(
            &app,
            Method::POST,
            "/api/validate",
            Some(json!({"username": "Steve", "api_key": "bad"})),
        )
        .await;
        assert_eq!(body["result"], "unauthorized");
        assert_eq!(body["error"], "invalid_api_key");
    }

    #[tokio::test]
    async fn test_create_and_read_target() {
        let (app, manager) = test_app(ok_http());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/targets",
            Some(json!({"username": " Steve "})),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(body["title"], "Donut SMP: Steve");
        assert_eq!(body["unique_id"], "abc-123");

        let mut rx = manager.subscribe("steve").await.unwrap();
        rx.wait_for(|s| s.cycles >= 1).await.unwrap();

        let (status, body) = call(&app, Method::GET, "/api/targets/steve/stats", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["kills"], 5);

        let (status, body) = call(&app, Method::GET, "/api/targets", None).await;
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["state"]["phase"], "idle");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/targets",
            Some(json!({"username": "Steve"})),
        )
        .await;
        assert_eq!(status, 409);

        let (status, _) = call(&app, Method::POST, "/api/targets/Steve/refresh", None).await;
        assert_eq!(status, 200);

        let (status, _) = call(&app, Method::DELETE, "/api/targets/Steve", None).await;
        assert_eq!(status, 200);

        let (status, body) = call(&app, Method::GET, "/api/targets/Steve", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_create_target_errors() {
        let (app, manager) = test_app(FakeHttp::new().reply(Endpoint::Lookup, Reply::raw(404, "")));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/targets",
            Some(json!({"username": "Ghost"})),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "user_not_found");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/targets",
            Some(json!({"username": "   "})),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(manager.target_count().await, 0);

        let (app, _) = test_app(FakeHttp::new().reply(Endpoint::Lookup, Reply::connect_error()));
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/targets",
            Some(json!({"username": "Steve"})),
        )
        .await;
        assert_eq!(status, 502);
        assert!(body["error"].as_str().unwrap().starts_with("cannot_connect"));
    }
}
