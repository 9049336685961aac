use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::identity::IdentityId;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::domain::error::OperationError;
use crate::domain::types::OperationId;
use crate::use_cases::create_wallet::CreateWalletUseCase;
use crate::use_cases::fund_wallet::FundWalletUseCase;
use crate::use_cases::get_operation::GetOperationUseCase;
use crate::use_cases::get_wallet::GetWalletUseCase;
use crate::use_cases::submit_intent::{IntentOutcome, SubmitIntentUseCase};

// Estado compartido de la aplicación
pub struct AppState {
    pub submit_intent_use_case: SubmitIntentUseCase,
    pub get_operation_use_case: GetOperationUseCase,
    pub create_wallet_use_case: CreateWalletUseCase,
    pub get_wallet_use_case: GetWalletUseCase,
    pub fund_wallet_use_case: FundWalletUseCase,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/operations/mint", post(submit_mint))
        .route("/api/operations/transfer", post(submit_transfer))
        .route("/api/operations/burn", post(submit_burn))
        .route("/api/operations/{id}", get(get_operation))
        .route("/api/wallets", post(create_wallet))
        .route("/api/wallets/{id}", get(get_wallet))
        .route("/api/wallets/{id}/fund", post(fund_wallet))
        .route("/health", get(health))
        .layer(CorsLayer::permissive()) // CORS permisivo; el layer responde el preflight
        .with_state(state)
}

// DTO de entrada para intent de mint
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub idempotency_key: String,
    pub user_wallet_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub metadata: Option<String>,
    // Campos deprecados: hoy están fijados internamente (emisor por
    // configuración, assetScale=0, maximumAmount=amount, transferFee=0) y su
    // presencia es un 400 que los lista
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub issuer_wallet_id: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub asset_scale: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub maximum_amount: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub transfer_fee: Option<Value>,
}

impl MintRequest {
    fn reject_deprecated(&self) -> Result<(), OperationError> {
        let mut present = Vec::new();
        if self.issuer_wallet_id.is_some() {
            present.push("issuerWalletId");
        }
        if self.asset_scale.is_some() {
            present.push("assetScale");
        }
        if self.maximum_amount.is_some() {
            present.push("maximumAmount");
        }
        if self.transfer_fee.is_some() {
            present.push("transferFee");
        }

        if present.is_empty() {
            Ok(())
        } else {
            Err(OperationError::DeprecatedFields(present.join(", ")))
        }
    }
}

// DTO de entrada para intent de transfer
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub idempotency_key: String,
    pub source_wallet_id: String,
    pub destination_wallet_id: String,
    pub issuance_id: String,
    pub amount: Decimal,
}

// DTO de entrada para intent de burn
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub idempotency_key: String,
    /// Aceptado por compatibilidad de API; siempre es el emisor configurado.
    #[serde(default)]
    pub issuer_wallet_id: Option<String>,
    pub holder_wallet_id: String,
    pub issuance_id: String,
    pub amount: Decimal,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<bool>,
}

// DTO de entrada para crear billetera
#[derive(Deserialize, Default, ToSchema)]
pub struct CreateWalletRequest {
    #[serde(default)]
    pub seed: Option<String>,
}

/// 201 para una operación nueva, 200 para un replay idempotente; el cuerpo es
/// el mismo en ambos casos.
fn intent_response(outcome: IntentOutcome) -> (StatusCode, Json<Value>) {
    let status = match &outcome {
        IntentOutcome::Created(_) => StatusCode::CREATED,
        IntentOutcome::Replayed(_) => StatusCode::OK,
    };
    let details = outcome.details();
    (
        status,
        Json(json!({
            "operationId": details.operation.id,
            "status": details.operation.status,
            "steps": details.steps,
        })),
    )
}

// Handler: Someter un intent de mint
// POST /api/operations/mint
#[utoipa::path(
    post,
    path = "/api/operations/mint",
    request_body = MintRequest,
    responses(
        (status = 201, description = "Operation accepted"),
        (status = 200, description = "Idempotent replay of an existing operation"),
        (status = 400, description = "Missing or deprecated fields"),
        (status = 404, description = "Referenced wallet does not exist")
    )
)]
pub async fn submit_mint(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MintRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.reject_deprecated()?;

    let outcome = state
        .submit_intent_use_case
        .mint(
            payload.idempotency_key,
            IdentityId::new(payload.user_wallet_id),
            payload.amount,
            payload.metadata,
        )
        .await?;

    Ok(intent_response(outcome))
}

// Handler: Someter un intent de transfer
// POST /api/operations/transfer
#[utoipa::path(
    post,
    path = "/api/operations/transfer",
    request_body = TransferRequest,
    responses(
        (status = 201, description = "Operation accepted"),
        (status = 200, description = "Idempotent replay of an existing operation"),
        (status = 400, description = "Missing or invalid fields"),
        (status = 404, description = "Referenced wallet does not exist")
    )
)]
pub async fn submit_transfer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = state
        .submit_intent_use_case
        .transfer(
            payload.idempotency_key,
            IdentityId::new(payload.source_wallet_id),
            IdentityId::new(payload.destination_wallet_id),
            payload.issuance_id,
            payload.amount,
        )
        .await?;

    Ok(intent_response(outcome))
}

// Handler: Someter un intent de burn
// POST /api/operations/burn
#[utoipa::path(
    post,
    path = "/api/operations/burn",
    request_body = BurnRequest,
    responses(
        (status = 201, description = "Operation accepted"),
        (status = 200, description = "Idempotent replay of an existing operation"),
        (status = 400, description = "Missing or invalid fields"),
        (status = 404, description = "Referenced wallet does not exist")
    )
)]
pub async fn submit_burn(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BurnRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = state
        .submit_intent_use_case
        .burn(
            payload.idempotency_key,
            IdentityId::new(payload.holder_wallet_id),
            payload.issuance_id,
            payload.amount,
        )
        .await?;

    Ok(intent_response(outcome))
}

// Handler: Estado de una operación (completo o liviano con ?status=true)
// GET /api/operations/{id}
#[utoipa::path(
    get,
    path = "/api/operations/{id}",
    params(
        ("id" = Uuid, Path, description = "Operation id"),
        ("status" = Option<bool>, Query, description = "Return the operation only, without steps")
    ),
    responses(
        (status = 200, description = "Operation status"),
        (status = 404, description = "Unknown operation")
    )
)]
pub async fn get_operation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let include_steps = !query.status.unwrap_or(false);

    let (operation, steps) = state
        .get_operation_use_case
        .execute(OperationId(id), include_steps)
        .await?;

    let body = match steps {
        Some(steps) => json!({ "operation": operation, "steps": steps }),
        None => json!({ "operation": operation }),
    };

    Ok(Json(body))
}

// Handler: Crear una billetera de usuario (seed opcional)
// POST /api/wallets
#[utoipa::path(
    post,
    path = "/api/wallets",
    request_body = CreateWalletRequest,
    responses((status = 201, description = "Wallet created"))
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // El cuerpo es opcional: sin cuerpo (o {}) se genera el par completo
    let seed = if body.is_empty() {
        None
    } else {
        let request: CreateWalletRequest = serde_json::from_slice(&body).map_err(|e| {
            ApiError::Wallet(crate::domain::error::WalletError::InvalidData(format!(
                "invalid request body: {}",
                e
            )))
        })?;
        request.seed
    };

    let wallet = state.create_wallet_use_case.execute(seed).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": wallet.id,
            "address": wallet.address,
            "createdAt": wallet.created_at,
        })),
    ))
}

// Handler: Ver una billetera; {id}="issuer" resuelve a la virtual del emisor
// GET /api/wallets/{id}
#[utoipa::path(
    get,
    path = "/api/wallets/{id}",
    params(("id" = String, Path, description = "Wallet id, or the reserved literal \"issuer\"")),
    responses(
        (status = 200, description = "Wallet view"),
        (status = 404, description = "Unknown wallet")
    )
)]
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let view = state.get_wallet_use_case.execute(&id).await?;
    Ok(Json(json!(view)))
}

// Handler: Fondear por faucet (solo redes de prueba)
// POST /api/wallets/{id}/fund
#[utoipa::path(
    post,
    path = "/api/wallets/{id}/fund",
    params(("id" = String, Path, description = "Wallet id")),
    responses(
        (status = 200, description = "Funding requested"),
        (status = 400, description = "The issuer cannot be faucet funded"),
        (status = 404, description = "Unknown wallet")
    )
)]
pub async fn fund_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (address, balance) = state.fund_wallet_use_case.execute(&id).await?;
    Ok(Json(json!({ "address": address, "balance": balance })))
}

// Handler: Liveness
// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_request(json_body: Value) -> MintRequest {
        serde_json::from_value(json_body).unwrap()
    }

    #[test]
    fn test_deprecated_fields_are_listed_in_order() {
        let request = mint_request(json!({
            "idempotencyKey": "key-1",
            "userWalletId": "wallet-a",
            "amount": "1000",
            "assetScale": 2,
            "transferFee": 0
        }));

        let err = request.reject_deprecated().unwrap_err();
        assert_eq!(
            err,
            OperationError::DeprecatedFields("assetScale, transferFee".to_string())
        );
    }

    #[test]
    fn test_clean_mint_request_passes() {
        let request = mint_request(json!({
            "idempotencyKey": "key-1",
            "userWalletId": "wallet-a",
            "amount": "1000",
            "metadata": "hello"
        }));

        assert!(request.reject_deprecated().is_ok());
        assert_eq!(request.amount, Decimal::from(1000));
    }

    #[test]
    fn test_burn_request_accepts_issuer_wallet_id_for_compatibility() {
        let request: BurnRequest = serde_json::from_value(json!({
            "idempotencyKey": "key-1",
            "issuerWalletId": "issuer",
            "holderWalletId": "wallet-a",
            "issuanceId": "ISS-1",
            "amount": "5"
        }))
        .unwrap();

        assert_eq!(request.issuer_wallet_id.as_deref(), Some("issuer"));
        assert_eq!(request.holder_wallet_id, "wallet-a");
    }
}
