//! HTTP request handlers and request/response bodies.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use validator::Validate;

use crate::app::{AppState, TransferReceipt};
use crate::domain::{
    AppError, BlockchainError, Domain, DomainAddress, ErrorDetail, ErrorResponse, HealthResponse,
    HealthStatus, Network, TokenAmount, TokenBalance, TransactionId, TransferDomainError,
    TransferDomainPayload, TransferItem, TransferLeg, ValidationError,
};

/// Upper bound on items accepted in one request.
pub const MAX_ITEMS: u64 = 32;

/// One side of a transfer as sent by clients.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LegRequest {
    /// Address string or raw locking-script hex
    #[validate(length(min = 1, max = 128))]
    pub address: String,
    /// `<amount>@<token>`, e.g. `3@DFI` or `1.5@0`
    #[validate(length(min = 3, max = 64))]
    pub amount: String,
    pub domain: Domain,
    /// Auxiliary data as hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2048))]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemRequest {
    #[validate(nested)]
    pub src: LegRequest,
    #[validate(nested)]
    pub dst: LegRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferDomainRequest {
    #[validate(length(min = 1, max = MAX_ITEMS), nested)]
    pub items: Vec<ItemRequest>,
    /// Where change is returned; defaults to the first DVM leg address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_address: Option<String>,
}

impl TransferDomainRequest {
    pub fn to_payload(&self, network: Network) -> Result<TransferDomainPayload, AppError> {
        let items = self
            .items
            .iter()
            .map(|item| {
                Ok(TransferItem::new(
                    leg_from_request(&item.src, network)?,
                    leg_from_request(&item.dst, network)?,
                ))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(TransferDomainPayload::new(items)?)
    }

    pub fn change_address(&self, network: Network) -> Result<Option<DomainAddress>, AppError> {
        self.change_address
            .as_deref()
            .map(|raw| DomainAddress::classify(raw, network))
            .transpose()
            .map_err(AppError::from)
    }
}

fn leg_from_request(leg: &LegRequest, network: Network) -> Result<TransferLeg, AppError> {
    let address = DomainAddress::classify(&leg.address, network)?;
    let amount = TokenAmount::from_str(&leg.amount)?;
    let data = match &leg.data {
        Some(data) => hex::decode(data).map_err(|e| ValidationError::InvalidField {
            field: "data".to_string(),
            message: e.to_string(),
        })?,
        None => Vec::new(),
    };
    Ok(TransferLeg::new(address, amount, leg.domain).with_data(data))
}

/// A decoded leg, with the address rendered for the configured network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegView {
    pub address: String,
    pub amount: String,
    pub domain: Domain,
    pub data: String,
}

impl LegView {
    fn new(leg: &TransferLeg, network: Network) -> Self {
        Self {
            address: leg.address.render(network),
            amount: leg.amount.to_string(),
            domain: leg.domain,
            data: hex::encode(&leg.data),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemView {
    pub src: LegView,
    pub dst: LegView,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DecodeRequest {
    #[validate(length(min = 2, max = 20000))]
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResponse {
    pub items: Vec<ItemView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeResponse {
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitTransactionRequest {
    #[validate(length(min = 2))]
    pub hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub txid: TransactionId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalancesQuery {
    #[serde(default)]
    pub include_evm: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalancesResponse {
    pub balances: Vec<TokenBalance>,
}

fn parse_request(
    state: &AppState,
    request: &TransferDomainRequest,
) -> Result<TransferDomainPayload, AppError> {
    request.validate()?;
    request.to_payload(state.service.network())
}

/// Encode a payload into the marker output's locking script
pub async fn encode_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferDomainRequest>,
) -> Result<Json<EncodeResponse>, AppError> {
    let payload = parse_request(&state, &request)?;
    Ok(Json(EncodeResponse {
        script: state.service.encode_transfer_domain(&payload),
    }))
}

/// Decode a marker script back into items
pub async fn decode_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecodeRequest>,
) -> Result<Json<DecodeResponse>, AppError> {
    request.validate()?;
    let payload = state.service.decode_transfer_domain(&request.script)?;
    let network = state.service.network();
    Ok(Json(DecodeResponse {
        items: payload
            .items()
            .iter()
            .map(|item| ItemView {
                src: LegView::new(&item.src, network),
                dst: LegView::new(&item.dst, network),
            })
            .collect(),
    }))
}

/// Run the precondition checks without building anything
pub async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferDomainRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    let payload = parse_request(&state, &request)?;
    state.service.validate(&payload).await?;
    Ok(Json(ValidateResponse { valid: true }))
}

/// Build and sign without broadcasting
pub async fn build_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferDomainRequest>,
) -> Result<Json<TransferReceipt>, AppError> {
    let payload = parse_request(&state, &request)?;
    let change = request.change_address(state.service.network())?;
    let signed = state.service.build_transfer_domain(&payload, change).await?;
    Ok(Json(TransferReceipt::from(&signed)))
}

/// Validate, build, sign and broadcast
pub async fn transfer_domain_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferDomainRequest>,
) -> Result<Json<TransferReceipt>, AppError> {
    let payload = parse_request(&state, &request)?;
    let change = request.change_address(state.service.network())?;
    let receipt = state.service.transfer_domain(&payload, change).await?;
    Ok(Json(receipt))
}

/// Validate locally and let the node build the transfer
pub async fn node_transfer_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferDomainRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let payload = parse_request(&state, &request)?;
    let txid = state.service.transfer_domain_via_node(&payload).await?;
    Ok(Json(SubmitResponse { txid }))
}

/// Broadcast a raw signed transaction
pub async fn submit_transaction_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitTransactionRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    request.validate()?;
    let txid = state.service.submit_raw_hex(&request.hex).await?;
    Ok(Json(SubmitResponse { txid }))
}

pub async fn balances_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BalancesQuery>,
) -> Result<Json<BalancesResponse>, AppError> {
    let balances = state.service.balances(query.include_evm).await?;
    Ok(Json(BalancesResponse { balances }))
}

/// Detailed health check
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Prometheus scrape output
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn transfer_domain_status(kind: &TransferDomainError) -> StatusCode {
    match kind {
        TransferDomainError::NotOwner { .. } => StatusCode::FORBIDDEN,
        TransferDomainError::InsufficientBalance { .. }
        | TransferDomainError::NetworkRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::TransferDomain(kind) => {
                (transfer_domain_status(kind), kind.kind(), self.to_string())
            }
            AppError::Submission(submission) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                submission.kind.kind(),
                submission.raw.clone(),
            ),
            AppError::Blockchain(bc_err) => match bc_err {
                BlockchainError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "blockchain_error",
                    self.to_string(),
                ),
                BlockchainError::InsufficientFunds { .. } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    self.to_string(),
                ),
                BlockchainError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                BlockchainError::Rejected { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "rejected",
                    self.to_string(),
                ),
                BlockchainError::RpcError(_) => {
                    (StatusCode::BAD_GATEWAY, "blockchain_error", self.to_string())
                }
                BlockchainError::SigningFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "signing_failed",
                    self.to_string(),
                ),
            },
            AppError::Transaction(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_transaction",
                self.to_string(),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                self.to_string(),
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::NotSupported(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_supported",
                self.to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let details = match &self {
            AppError::TransferDomain(kind) => kind.details(),
            AppError::Submission(submission) => submission.kind.details(),
            AppError::Blockchain(BlockchainError::InsufficientFunds {
                required,
                available,
            }) => Some(json!({ "required": required, "available": available })),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}
