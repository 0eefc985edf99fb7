use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use omatrust_contracts::{ErrorBody, ErrorCode, WitnessResponse};
use std::time::Instant;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{StartupError, WitnessConfig};
use crate::error::WitnessError;
use crate::orchestrator::WitnessService;

pub const WITNESS_ROUTE: &str = "/v1/controller-witness";
const REQUEST_ID_HEADER: &str = "x-omatrust-request-id";

#[derive(Clone)]
pub struct AppState {
    service: WitnessService,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(config: WitnessConfig) -> Result<Router, StartupError> {
    let service = WitnessService::from_config(&config)?;
    Ok(router_with_service(service))
}

pub fn router_with_service(service: WitnessService) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(WITNESS_ROUTE, post(controller_witness))
        .with_state(AppState { service })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn controller_witness(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "witness.request",
        request_id = %request_id,
        subject = tracing::field::Empty,
        controller = tracing::field::Empty,
        method = tracing::field::Empty,
    );
    let handler_result: Result<Json<WitnessResponse>, ApiError> = async {
        let payload = serde_json::from_slice::<serde_json::Value>(&body)
            .unwrap_or(serde_json::Value::Null);

        match state.service.handle(&payload).await {
            Ok(outcome) => {
                crate::metrics::observe_outcome(outcome.outcome_code());
                Ok(Json(outcome.into_response()))
            }
            Err(err) => {
                crate::metrics::observe_outcome(err.code.as_str());
                if err.code == ErrorCode::ServerError {
                    tracing::error!(code = %err.code, message = %err.message, "witness.request_failed");
                } else {
                    tracing::info!(code = %err.code, message = %err.message, "witness.request_rejected");
                }
                Err(json_error(&err))
            }
        }
    }
    .instrument(span)
    .await;

    let status = match &handler_result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        WITNESS_ROUTE,
        "POST",
        status.as_u16(),
        request_started.elapsed(),
    );

    let mut response = handler_result.into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

fn json_error(err: &WitnessError) -> ApiError {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.body()))
}
