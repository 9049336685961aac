use chrono::{DateTime, Utc};
use common::identity::IdentityId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::OperationError;
use crate::domain::types::{OperationId, StepId};

/// Límite del ledger para metadata de emisión (bytes antes de hex-encoding).
const MAX_METADATA_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    MINT,
    TRANSFER,
    BURN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    PENDING,
    IN_PROGRESS,
    SUCCESS,
    FAILED,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::SUCCESS | OperationStatus::FAILED)
    }
}

/// Estados de un paso. Solo se avanza hacia adelante:
/// PENDING -> SUBMITTED -> PENDING_VALIDATION -> {VALIDATED_SUCCESS, VALIDATED_FAILED}.
///
/// Un timeout de la espera inline deja el paso en PENDING_VALIDATION y el poller
/// lo finaliza; no existe un estado TIMEOUT separado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "step_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    PENDING,
    SUBMITTED,
    PENDING_VALIDATION,
    VALIDATED_SUCCESS,
    VALIDATED_FAILED,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::VALIDATED_SUCCESS | StepStatus::VALIDATED_FAILED
        )
    }
}

/// Etiquetas de rol de cada paso dentro de una operación.
pub mod step_kind {
    pub const ISSUER_MINT: &str = "issuer_mint";
    pub const USER_AUTHORIZE: &str = "user_authorize";
    pub const RECEIVER_AUTHORIZE: &str = "receiver_authorize";
    pub const ISSUER_TRANSFER: &str = "issuer_transfer";
    pub const SENDER_TRANSFER: &str = "sender_transfer";
    pub const ISSUER_CLAWBACK: &str = "issuer_clawback";
}

/// Modelo de Entidad: Operation.
///
/// Representa un intent lógico del usuario (MINT/TRANSFER/BURN) con estado
/// durable. Los ids de billetera son cadenas y no FKs porque pueden portar el
/// literal reservado `"issuer"`, para el cual no existe fila en `wallets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub idempotency_key: String,
    /// Handle de la clase de token asignado por el ledger. Para MINT arranca en
    /// None y se descubre al validarse el paso 1; para TRANSFER/BURN viene en
    /// el intent.
    pub issuance_id: Option<String>,
    pub source_wallet_id: Option<IdentityId>,
    pub destination_wallet_id: Option<IdentityId>,
    pub amount: Decimal,
    /// Metadata opcional de emisión (solo MINT), persistida para poder
    /// reconstruir el paso 1 tras un reinicio.
    pub metadata: Option<String>,
    pub status: OperationStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Modelo de Entidad: OperationStep.
///
/// Una transacción de ledger dentro de una operación. Mutada únicamente por el
/// step executor y el validation poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStep {
    pub id: StepId,
    pub operation_id: OperationId,
    pub step_no: i32,
    pub kind: String,
    pub signer_wallet_id: Option<IdentityId>,
    pub ledger_tx_type: String,
    pub tx_hash: Option<String>,
    pub submit_result: Option<Value>,
    pub validated_result: Option<Value>,
    pub status: StepStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationStep {
    fn new(
        operation_id: OperationId,
        step_no: i32,
        kind: &str,
        signer: IdentityId,
        ledger_tx_type: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::new(),
            operation_id,
            step_no,
            kind: kind.to_string(),
            signer_wallet_id: Some(signer),
            ledger_tx_type: ledger_tx_type.to_string(),
            tx_hash: None,
            submit_result: None,
            validated_result: None,
            status: StepStatus::PENDING,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Operation {
    /// Materializa un intent de MINT: crear emisión, autorizar al destino y
    /// pagar del emisor al destino. Tres pasos, numerados desde 1.
    pub fn mint(
        idempotency_key: String,
        user_wallet_id: IdentityId,
        amount: Decimal,
        metadata: Option<String>,
    ) -> Result<(Self, Vec<OperationStep>), OperationError> {
        validate_idempotency_key(&idempotency_key)?;
        validate_amount(amount)?;
        validate_user_identity(&user_wallet_id, "userWalletId")?;

        if let Some(meta) = &metadata {
            if meta.len() > MAX_METADATA_BYTES {
                return Err(OperationError::InvalidIntent(format!(
                    "metadata exceeds {} bytes",
                    MAX_METADATA_BYTES
                )));
            }
        }

        let operation = Self::base(
            OperationKind::MINT,
            idempotency_key,
            None,
            Some(IdentityId::issuer()),
            Some(user_wallet_id.clone()),
            amount,
            metadata,
        );

        let steps = vec![
            OperationStep::new(
                operation.id,
                1,
                step_kind::ISSUER_MINT,
                IdentityId::issuer(),
                "MPTokenIssuanceCreate",
            ),
            OperationStep::new(
                operation.id,
                2,
                step_kind::USER_AUTHORIZE,
                user_wallet_id,
                "MPTokenAuthorize",
            ),
            OperationStep::new(
                operation.id,
                3,
                step_kind::ISSUER_TRANSFER,
                IdentityId::issuer(),
                "Payment",
            ),
        ];

        Ok((operation, steps))
    }

    /// Materializa un intent de TRANSFER: el receptor autoriza la emisión y el
    /// origen paga. Dos pasos.
    pub fn transfer(
        idempotency_key: String,
        source_wallet_id: IdentityId,
        destination_wallet_id: IdentityId,
        issuance_id: String,
        amount: Decimal,
    ) -> Result<(Self, Vec<OperationStep>), OperationError> {
        validate_idempotency_key(&idempotency_key)?;
        validate_amount(amount)?;
        validate_user_identity(&source_wallet_id, "sourceWalletId")?;
        validate_user_identity(&destination_wallet_id, "destinationWalletId")?;
        validate_issuance_id(&issuance_id)?;

        if source_wallet_id == destination_wallet_id {
            return Err(OperationError::SameWallet);
        }

        let operation = Self::base(
            OperationKind::TRANSFER,
            idempotency_key,
            Some(issuance_id),
            Some(source_wallet_id.clone()),
            Some(destination_wallet_id.clone()),
            amount,
            None,
        );

        let steps = vec![
            OperationStep::new(
                operation.id,
                1,
                step_kind::RECEIVER_AUTHORIZE,
                destination_wallet_id,
                "MPTokenAuthorize",
            ),
            OperationStep::new(
                operation.id,
                2,
                step_kind::SENDER_TRANSFER,
                source_wallet_id,
                "Payment",
            ),
        ];

        Ok((operation, steps))
    }

    /// Materializa un intent de BURN: clawback del emisor sobre el holder. Un paso.
    pub fn burn(
        idempotency_key: String,
        holder_wallet_id: IdentityId,
        issuance_id: String,
        amount: Decimal,
    ) -> Result<(Self, Vec<OperationStep>), OperationError> {
        validate_idempotency_key(&idempotency_key)?;
        validate_amount(amount)?;
        validate_user_identity(&holder_wallet_id, "holderWalletId")?;
        validate_issuance_id(&issuance_id)?;

        let operation = Self::base(
            OperationKind::BURN,
            idempotency_key,
            Some(issuance_id),
            Some(IdentityId::issuer()),
            Some(holder_wallet_id.clone()),
            amount,
            None,
        );

        let steps = vec![OperationStep::new(
            operation.id,
            1,
            step_kind::ISSUER_CLAWBACK,
            IdentityId::issuer(),
            "Clawback",
        )];

        Ok((operation, steps))
    }

    fn base(
        kind: OperationKind,
        idempotency_key: String,
        issuance_id: Option<String>,
        source_wallet_id: Option<IdentityId>,
        destination_wallet_id: Option<IdentityId>,
        amount: Decimal,
        metadata: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::new(),
            kind,
            idempotency_key,
            issuance_id,
            source_wallet_id,
            destination_wallet_id,
            amount,
            metadata,
            status: OperationStatus::PENDING,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_idempotency_key(key: &str) -> Result<(), OperationError> {
    if key.trim().is_empty() {
        return Err(OperationError::InvalidIntent(
            "idempotencyKey is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), OperationError> {
    if amount <= Decimal::ZERO || !amount.fract().is_zero() {
        return Err(OperationError::InvalidAmount);
    }
    Ok(())
}

fn validate_user_identity(id: &IdentityId, field: &str) -> Result<(), OperationError> {
    if id.as_str().trim().is_empty() {
        return Err(OperationError::InvalidIntent(format!(
            "{} is required",
            field
        )));
    }
    if id.is_issuer() {
        return Err(OperationError::InvalidIntent(format!(
            "{} must be a user wallet, not the issuer",
            field
        )));
    }
    Ok(())
}

fn validate_issuance_id(issuance_id: &str) -> Result<(), OperationError> {
    if issuance_id.trim().is_empty() {
        return Err(OperationError::InvalidIntent(
            "issuanceId is required".to_string(),
        ));
    }
    Ok(())
}

/// Clasifica el TransactionResult reportado por el ledger para un paso validado.
/// `tesSUCCESS` es el único código exitoso; tec*/tem*/tef* y cualquier otro
/// código son fallas permanentes.
pub fn classify_transaction_result(transaction_result: &str) -> StepStatus {
    if transaction_result == "tesSUCCESS" {
        StepStatus::VALIDATED_SUCCESS
    } else {
        StepStatus::VALIDATED_FAILED
    }
}

/// Extrae el identificador de emisión asignado por el ledger de la metadata
/// validada del paso 1 de un MINT.
pub fn extract_issuance_id(metadata: &Value) -> Option<String> {
    metadata
        .get("mpt_issuance_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Modelo de Entidad: Wallet.
///
/// Registro de custodia de una identidad de usuario. El seed se guarda cifrado
/// con AES-256-GCM; el plaintext nunca sale del credential store.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: String,
    pub address: String,
    pub seed_ciphertext: Vec<u8>,
    pub seed_nonce: Vec<u8>,
    pub seed_tag: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        address: String,
        seed_ciphertext: Vec<u8>,
        seed_nonce: Vec<u8>,
        seed_tag: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            seed_ciphertext,
            seed_nonce,
            seed_tag,
            created_at: now,
            updated_at: now,
        }
    }
}
