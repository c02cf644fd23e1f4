//! Challenge generation and verification endpoints
//!
//! - `POST /api/v1/challenges/generate` - create challenges for one user or
//!   for every user with a profile
//! - `POST /api/v1/challenges/verify` - check a user action against one or
//!   all of their pending challenges

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::routes::{error_response, json_response, service_error_response};
use crate::server::AppState;
use crate::services::generator::{GenerationTarget, UserGenerationResult};
use crate::services::policy::ActionData;
use crate::services::verifier::VerifyTarget;

/// Generation request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    /// Target one user
    #[serde(default)]
    user_id: Option<String>,
    /// Target every user with a profile
    #[serde(default)]
    batch_mode: bool,
}

/// Generation response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    /// Users that received at least one new challenge
    processed: usize,
    results: Vec<UserGenerationResult>,
}

/// Handle POST /api/v1/challenges/generate
pub async fn handle_generate(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: GenerateRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    let target = match (&request.user_id, request.batch_mode) {
        (_, true) => GenerationTarget::Batch,
        (Some(user_id), false) if !user_id.trim().is_empty() => {
            GenerationTarget::Single(user_id.clone())
        }
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Either userId or batchMode is required",
            )
        }
    };

    info!(batch = request.batch_mode, "Generation requested");

    match state.generator.generate(target).await {
        Ok(report) => json_response(&GenerateResponse {
            success: true,
            processed: report.processed,
            results: report.results,
        }),
        Err(e) => service_error_response(&e),
    }
}

/// Verification request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    user_id: String,
    /// A challenge id, or the literal "auto" to try all pending challenges
    challenge_id: String,
    /// Action key: comment, rate_games, add_favorites, avatar_change, change_name
    action: String,
    /// Action-specific payload
    #[serde(default)]
    action_data: ActionData,
}

/// Verification response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    verified: bool,
    message: String,
}

/// Handle POST /api/v1/challenges/verify
pub async fn handle_verify(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: VerifyRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    if request.challenge_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "challengeId is required");
    }

    let target = VerifyTarget::parse(&request.challenge_id);

    match state
        .verifier
        .verify(&request.user_id, target, &request.action, &request.action_data)
        .await
    {
        Ok(evaluation) => json_response(&VerifyResponse {
            verified: evaluation.verified,
            message: evaluation.message,
        }),
        Err(e) => service_error_response(&e),
    }
}

/// Collect and parse a JSON request body
pub(crate) async fn read_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> std::result::Result<T, Response<Full<Bytes>>> {
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read request body: {}", e),
            ))
        }
    };

    serde_json::from_slice(&body).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e))
    })
}
