//! Verification status endpoint
//!
//! `POST /api/v1/verification/status` recomputes a user's standing from
//! their completion records and returns it. The recompute also rewrites
//! the denormalized profile fields, so reads double as repair.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::routes::challenges::read_json_body;
use crate::routes::{error_response, json_response, service_error_response};
use crate::server::AppState;

/// Status request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    user_id: String,
}

/// Handle POST /api/v1/verification/status
pub async fn handle_status(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: StatusRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    if request.user_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "userId is required");
    }

    match state.status.recompute(&request.user_id).await {
        Ok(status) => json_response(&status),
        Err(e) => service_error_response(&e),
    }
}
