use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::{OperationError, WalletError};

// Error unificado de la API del orquestador. Los handlers nunca exponen
// estructuras internas: el cuerpo es siempre {"error", "details"?}
pub enum ApiError {
    Operation(OperationError),
    Wallet(WalletError),
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        ApiError::Operation(err)
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError::Wallet(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            ApiError::Operation(err) => match err {
                OperationError::DeprecatedFields(ref fields) => {
                    let listed: Vec<String> =
                        fields.split(", ").map(|f| f.to_string()).collect();
                    (StatusCode::BAD_REQUEST, err.to_string(), Some(listed))
                }
                OperationError::InvalidIntent(_)
                | OperationError::InvalidAmount
                | OperationError::SameWallet => {
                    (StatusCode::BAD_REQUEST, err.to_string(), None)
                }
                OperationError::NotFound(_) | OperationError::WalletNotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string(), None)
                }
                OperationError::DuplicateIdempotencyKey(_) => {
                    (StatusCode::CONFLICT, err.to_string(), None)
                }
                other => {
                    tracing::error!("Internal operation error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        None,
                    )
                }
            },
            ApiError::Wallet(err) => match err {
                WalletError::InvalidData(_) | WalletError::IssuerFunding => {
                    (StatusCode::BAD_REQUEST, err.to_string(), None)
                }
                WalletError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string(), None),
                other => {
                    tracing::error!("Internal wallet error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        None,
                    )
                }
            },
        };

        let body = match details {
            Some(details) => Json(json!({ "error": error_message, "details": details })),
            None => Json(json!({ "error": error_message })),
        };

        (status, body).into_response()
    }
}
