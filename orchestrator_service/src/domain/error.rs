use crate::domain::types::OperationId;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum OperationError {
    #[error("Operation not found with ID: {0}")]
    NotFound(OperationId),

    #[error("Wallet not found with ID: {0}")]
    WalletNotFound(String),

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Amount must be a positive whole number")]
    InvalidAmount,

    #[error("Source and destination wallets must differ")]
    SameWallet,

    #[error("Deprecated fields are no longer accepted: {0}")]
    DeprecatedFields(String),

    #[error("An operation already exists for idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Invalid operation state: {0}")]
    InvalidState(String),

    #[error("Operation repository error: {0}")]
    RepositoryError(String),

    #[error("Ledger gateway error: {0}")]
    GatewayError(String),

    #[error("Secret store error: {0}")]
    SecretError(String),

    #[error("Validation wait timed out for step {0}")]
    ValidationTimeout(i32),

    #[error("Step {step_no} failed ledger validation with result {result}")]
    StepFailed { step_no: i32, result: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum WalletError {
    #[error("Wallet not found with ID: {0}")]
    NotFound(String),

    #[error("Invalid wallet data: {0}")]
    InvalidData(String),

    #[error("Faucet funding is not available for the issuer identity")]
    IssuerFunding,

    #[error("Wallet repository error: {0}")]
    RepositoryError(String),

    #[error("Ledger gateway error: {0}")]
    GatewayError(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum SecretError {
    #[error("No seed material found for identity: {0}")]
    NotFound(String),

    #[error("Stored seed material is corrupt for identity: {0}")]
    Integrity(String),

    #[error("Credential store misconfigured: {0}")]
    Configuration(String),

    #[error("The reserved issuer identity cannot be written to custody")]
    IssuerReserved,

    #[error("Secret repository error: {0}")]
    RepositoryError(String),
}

/// Errores del adaptador de ledger. `Connection` es transitorio (red, nodo
/// caído) y se reintenta dentro de la ventana de validación y por el poller;
/// `Protocol` es una respuesta definitiva del nodo que no tiene sentido
/// reintentar tal cual.
#[derive(Error, Debug, PartialEq)]
pub enum LedgerError {
    #[error("Ledger connection error: {0}")]
    Connection(String),

    #[error("Ledger protocol error: {0}")]
    Protocol(String),
}
