use crate::domain::entities::{
    Operation, OperationStatus, OperationStep, StepStatus, Wallet,
};
use crate::domain::error::{OperationError, WalletError};
use crate::domain::types::{OperationId, StepId};
use async_trait::async_trait;
use serde_json::Value;

// Port for Operation persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Inserta la operación y sus pasos en una sola transacción. Un choque con
    /// la constraint única de idempotencia retorna `DuplicateIdempotencyKey`.
    async fn create_with_steps(
        &self,
        operation: Operation,
        steps: Vec<OperationStep>,
    ) -> Result<Operation, OperationError>;

    async fn find_by_id(&self, id: OperationId) -> Result<Option<Operation>, OperationError>;

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Operation>, OperationError>;

    /// Pasos de una operación, ascendentes por `step_no`.
    async fn find_steps(&self, operation_id: OperationId)
        -> Result<Vec<OperationStep>, OperationError>;

    async fn find_step(&self, id: StepId) -> Result<Option<OperationStep>, OperationError>;

    /// Transición de estado de operación. Nunca saca a una operación de un
    /// estado terminal; esa transición se descarta silenciosamente.
    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> Result<(), OperationError>;

    async fn set_issuance_id(
        &self,
        id: OperationId,
        issuance_id: &str,
    ) -> Result<(), OperationError>;

    /// Registra hash y ack de submit, y marca el paso SUBMITTED.
    async fn mark_step_submitted(
        &self,
        id: StepId,
        tx_hash: &str,
        submit_result: Value,
    ) -> Result<(), OperationError>;

    async fn mark_step_pending_validation(&self, id: StepId) -> Result<(), OperationError>;

    /// Transición terminal del paso con su resultado validado. Solo aplica
    /// desde SUBMITTED o PENDING_VALIDATION; los pasos nunca retroceden.
    async fn mark_step_validated(
        &self,
        id: StepId,
        status: StepStatus,
        validated_result: Value,
    ) -> Result<(), OperationError>;

    async fn touch_step_checked(&self, id: StepId) -> Result<(), OperationError>;

    /// Pasos candidatos para el barrido del poller: SUBMITTED o
    /// PENDING_VALIDATION con tx_hash, los nunca chequeados primero.
    async fn find_steps_awaiting_validation(
        &self,
        limit: i64,
    ) -> Result<Vec<OperationStep>, OperationError>;
}

// Port for Wallet persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Wallet>, WalletError>;

    /// Reemplaza el material de seed cifrado de una billetera existente.
    async fn update_seed(
        &self,
        id: &str,
        seed_ciphertext: Vec<u8>,
        seed_nonce: Vec<u8>,
        seed_tag: Vec<u8>,
    ) -> Result<(), WalletError>;
}
