use chrono::{DateTime, Utc};
use common::identity::IdentityId;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::FromRow;

use crate::domain::entities::{
    Operation, OperationKind, OperationStatus, OperationStep, StepStatus, Wallet,
};
use crate::domain::types::{OperationId, StepId};

// Los ids de billetera se persisten como texto plano (pueden portar el literal
// reservado "issuer"); la conversión a IdentityId ocurre al mapear al dominio.

#[derive(Debug, FromRow)]
pub struct OperationModel {
    pub id: OperationId,
    pub kind: OperationKind,
    pub idempotency_key: String,
    pub issuance_id: Option<String>,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
    pub amount: Decimal,
    pub metadata: Option<String>,
    pub status: OperationStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Operation> for OperationModel {
    fn from(o: &Operation) -> Self {
        Self {
            id: o.id,
            kind: o.kind,
            idempotency_key: o.idempotency_key.clone(),
            issuance_id: o.issuance_id.clone(),
            source_wallet_id: o.source_wallet_id.as_ref().map(|w| w.as_str().to_string()),
            destination_wallet_id: o
                .destination_wallet_id
                .as_ref()
                .map(|w| w.as_str().to_string()),
            amount: o.amount,
            metadata: o.metadata.clone(),
            status: o.status,
            error_code: o.error_code.clone(),
            error_message: o.error_message.clone(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

impl From<OperationModel> for Operation {
    fn from(m: OperationModel) -> Self {
        Self {
            id: m.id,
            kind: m.kind,
            idempotency_key: m.idempotency_key,
            issuance_id: m.issuance_id,
            source_wallet_id: m.source_wallet_id.map(IdentityId::new),
            destination_wallet_id: m.destination_wallet_id.map(IdentityId::new),
            amount: m.amount,
            metadata: m.metadata,
            status: m.status,
            error_code: m.error_code,
            error_message: m.error_message,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct OperationStepModel {
    pub id: StepId,
    pub operation_id: OperationId,
    pub step_no: i32,
    pub kind: String,
    pub signer_wallet_id: Option<String>,
    pub ledger_tx_type: String,
    pub tx_hash: Option<String>,
    pub submit_result: Option<Value>,
    pub validated_result: Option<Value>,
    pub status: StepStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OperationStep> for OperationStepModel {
    fn from(s: &OperationStep) -> Self {
        Self {
            id: s.id,
            operation_id: s.operation_id,
            step_no: s.step_no,
            kind: s.kind.clone(),
            signer_wallet_id: s.signer_wallet_id.as_ref().map(|w| w.as_str().to_string()),
            ledger_tx_type: s.ledger_tx_type.clone(),
            tx_hash: s.tx_hash.clone(),
            submit_result: s.submit_result.clone(),
            validated_result: s.validated_result.clone(),
            status: s.status,
            last_checked_at: s.last_checked_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<OperationStepModel> for OperationStep {
    fn from(m: OperationStepModel) -> Self {
        Self {
            id: m.id,
            operation_id: m.operation_id,
            step_no: m.step_no,
            kind: m.kind,
            signer_wallet_id: m.signer_wallet_id.map(IdentityId::new),
            ledger_tx_type: m.ledger_tx_type,
            tx_hash: m.tx_hash,
            submit_result: m.submit_result,
            validated_result: m.validated_result,
            status: m.status,
            last_checked_at: m.last_checked_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct WalletModel {
    pub id: String,
    pub address: String,
    pub seed_ciphertext: Vec<u8>,
    pub seed_nonce: Vec<u8>,
    pub seed_tag: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Wallet> for WalletModel {
    fn from(w: &Wallet) -> Self {
        Self {
            id: w.id.clone(),
            address: w.address.clone(),
            seed_ciphertext: w.seed_ciphertext.clone(),
            seed_nonce: w.seed_nonce.clone(),
            seed_tag: w.seed_tag.clone(),
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

impl From<WalletModel> for Wallet {
    fn from(m: WalletModel) -> Self {
        Self {
            id: m.id,
            address: m.address,
            seed_ciphertext: m.seed_ciphertext,
            seed_nonce: m.seed_nonce,
            seed_tag: m.seed_tag,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}
