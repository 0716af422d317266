//! REST API for the Custody Service
//!
//! Thin axum layer over the service entry points. The acting account
//! comes from the `x-account` header; in production a gateway terminates
//! real authentication and injects it. Errors map to HTTP status codes
//! via the shared error codes.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::common::error::CustodyError;
use crate::custody::{CustodyService, CustodyStats};
use crate::types::group::CreateGroupRequest;
use crate::types::receipt::{
    ForceRequestMintRequest, ReceiptRefRequest, RecordRefundRequest, RequestBurnRequest,
    RequestMintRequest, VerifyMintRequest,
};
use crate::types::{GroupResponse, ReceiptResponse};

/// Build the API router
pub fn router(service: Arc<CustodyService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/groups", post(create_group))
        .route("/api/groups/:address", get(get_group).delete(delete_group))
        .route("/api/receipts/:id", get(get_receipt))
        .route("/api/mint/request", post(request_mint))
        .route("/api/mint/verify", post(verify_mint))
        .route("/api/mint/revoke", post(revoke_mint))
        .route("/api/mint/force-request", post(force_request_mint))
        .route("/api/burn/request", post(request_burn))
        .route("/api/burn/verify", post(verify_burn))
        .route("/api/burn/recover", post(recover_burn))
        .route("/api/refunds", post(record_refund))
        .route("/api/fees", get(get_fees).post(update_fees))
        .route("/api/fees/collect", post(collect_fee))
        .route("/api/admin/pause", post(set_paused))
        .route("/api/stats", get(get_stats))
        .layer(middleware::from_fn(trace_requests))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Log every request with a correlation id
async fn trace_requests(req: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        target: "kbtc::api",
        %correlation_id,
        %method,
        path,
        status = %response.status(),
        "request"
    );
    response
}

/// API error wrapper
struct ApiError(CustodyError);

impl From<CustodyError> for ApiError {
    fn from(err: CustodyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CustodyError::Authorization(_) => StatusCode::FORBIDDEN,
            CustodyError::NotFound(_) => StatusCode::NOT_FOUND,
            CustodyError::State(_) | CustodyError::Timing(_) => StatusCode::CONFLICT,
            CustodyError::Capacity(_) | CustodyError::Integrity(_) => StatusCode::BAD_REQUEST,
            CustodyError::Token(_) => StatusCode::BAD_GATEWAY,
            CustodyError::Storage(_) | CustodyError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorBody {
            error: self.0.to_string(),
            code: self.0.error_code(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Acting account from the `x-account` header
fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-account")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError(CustodyError::authorization("missing x-account header")))
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "kbtc-custody" }))
}

async fn create_group(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    let caller = caller(&headers)?;
    let group = service
        .create_group(
            &caller,
            &req.custody_address,
            req.required,
            req.capacity_sats,
            req.keepers,
        )
        .await?;
    Ok(Json(GroupResponse::from(&group)))
}

async fn delete_group(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Path(address): Path<String>,
) -> Result<StatusCode, ApiError> {
    let caller = caller(&headers)?;
    service.delete_group(&caller, &address).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_group(
    State(service): State<Arc<CustodyService>>,
    Path(address): Path<String>,
) -> Result<Json<GroupResponse>, ApiError> {
    let group = service.get_group(&address).await?;
    Ok(Json(GroupResponse::from(&group)))
}

async fn get_receipt(
    State(service): State<Arc<CustodyService>>,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let receipt = service.get_receipt(&id).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn request_mint(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<RequestMintRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service
        .request_mint(&caller, &req.custody_address, req.amount_sats, req.expected_nonce)
        .await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn verify_mint(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<VerifyMintRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service
        .verify_mint(
            &caller,
            &req.receipt_id,
            &req.btc_txid,
            req.btc_height,
            &req.signers,
            &req.signatures,
        )
        .await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn revoke_mint(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<ReceiptRefRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = caller(&headers)?;
    service.revoke_mint(&caller, &req.receipt_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn force_request_mint(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<ForceRequestMintRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service
        .force_request_mint(&caller, &req.custody_address, req.amount_sats, req.next_nonce)
        .await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn request_burn(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<RequestBurnRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service
        .request_burn(&caller, &req.receipt_id, &req.withdraw_destination)
        .await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn verify_burn(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<ReceiptRefRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service.verify_burn(&caller, &req.receipt_id).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn recover_burn(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<ReceiptRefRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = caller(&headers)?;
    let receipt = service.recover_burn(&caller, &req.receipt_id).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn record_refund(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<RecordRefundRequest>,
) -> Result<Json<crate::custody::RefundSlot>, ApiError> {
    let caller = caller(&headers)?;
    let slot = service
        .record_refund(&caller, &req.custody_address, &req.btc_txid)
        .await?;
    Ok(Json(slot))
}

/// Fee snapshot (token units as strings)
#[derive(Serialize)]
struct FeeStateResponse {
    mint_fee_bps: u64,
    burn_fee_bps: u64,
    accrued_units: String,
}

async fn get_fees(State(service): State<Arc<CustodyService>>) -> Json<FeeStateResponse> {
    let fees = service.fee_state().await;
    Json(FeeStateResponse {
        mint_fee_bps: fees.mint_fee_bps,
        burn_fee_bps: fees.burn_fee_bps,
        accrued_units: fees.accrued_units.to_string(),
    })
}

#[derive(Deserialize)]
struct UpdateFeesRequest {
    mint_fee_bps: Option<u64>,
    burn_fee_bps: Option<u64>,
}

async fn update_fees(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<UpdateFeesRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = caller(&headers)?;
    if let Some(bps) = req.mint_fee_bps {
        service.set_mint_fee_bps(&caller, bps).await?;
    }
    if let Some(bps) = req.burn_fee_bps {
        service.set_burn_fee_bps(&caller, bps).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CollectFeeRequest {
    to: String,
    /// u128 token units as a string
    amount_units: String,
}

async fn collect_fee(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<CollectFeeRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = caller(&headers)?;
    let amount: u128 = req
        .amount_units
        .parse()
        .map_err(|_| ApiError(CustodyError::state("invalid amount_units")))?;
    service.collect_fee(&caller, &req.to, amount).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PauseRequest {
    paused: bool,
}

async fn set_paused(
    State(service): State<Arc<CustodyService>>,
    headers: HeaderMap,
    Json(req): Json<PauseRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = caller(&headers)?;
    service.set_paused(&caller, req.paused).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_stats(State(service): State<Arc<CustodyService>>) -> Json<CustodyStats> {
    Json(service.stats().await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::custody::testutil::*;

    use super::*;

    async fn test_router() -> Router {
        let h = Harness::new().await;
        router(Arc::new(h.service))
    }

    #[tokio::test]
    async fn test_health() {
        let router = test_router().await;
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_group() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/groups/{}", POOL))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_group_is_404() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/groups/bc1q_ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_mint_requires_account_header() {
        let router = test_router().await;
        let body = serde_json::json!({
            "custody_address": POOL,
            "amount_sats": 1_000,
            "expected_nonce": 1,
        });

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mint/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_request_mint_roundtrip() {
        let router = test_router().await;
        let body = serde_json::json!({
            "custody_address": POOL,
            "amount_sats": 1_000,
            "expected_nonce": 1,
        });

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mint/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-account", "alice")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let receipt: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(receipt["recipient"], "alice");
        assert_eq!(receipt["status"], "deposit_requested");
    }

    #[tokio::test]
    async fn test_stale_nonce_maps_to_conflict() {
        let router = test_router().await;
        let body = serde_json::json!({
            "custody_address": POOL,
            "amount_sats": 1_000,
            "expected_nonce": 9,
        });

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mint/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-account", "alice")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error["code"], "STATE_ERROR");
    }
}
