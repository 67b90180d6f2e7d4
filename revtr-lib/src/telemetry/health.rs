use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde_json::json;

use crate::error::Result;

type RespBody = BoxBody<Bytes, hyper::Error>;

fn json_response(status: StatusCode, body: serde_json::Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(&body)?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Ok(Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)?)
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, json!({"status": "healthy"}))
}

/// Readiness check
/// Returns 200 when the service can take work, 503 with `reason` otherwise
pub fn ready_check_response(ready: bool, reason: &str) -> Result<Response<RespBody>> {
    if ready {
        json_response(StatusCode::OK, json!({"status": "ready"}))
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"status": "not_ready", "reason": reason}),
        )
    }
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, json!({"status": "alive"}))
}
