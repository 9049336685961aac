use common::identity::IdentityId;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::entities::{Operation, OperationStep};
use crate::domain::error::OperationError;
use crate::domain::repository::{OperationRepository, WalletRepository};
use crate::domain::types::OperationId;
use crate::use_cases::execute_operation::ExecuteOperationUseCase;

/// Operación materializada junto con sus pasos, como la ve el caller.
#[derive(Debug, Clone)]
pub struct OperationDetails {
    pub operation: Operation,
    pub steps: Vec<OperationStep>,
}

/// Desenlace del front-door: operación nueva (201) o replay idempotente (200).
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    Created(OperationDetails),
    Replayed(OperationDetails),
}

impl IntentOutcome {
    pub fn details(&self) -> &OperationDetails {
        match self {
            IntentOutcome::Created(details) | IntentOutcome::Replayed(details) => details,
        }
    }
}

/// Front-door de intents.
///
/// Valida el intent, aplica el contrato de idempotencia, materializa la
/// operación con sus pasos en una sola transacción y lanza el step executor en
/// segundo plano, retornando de inmediato. Una vez aceptado el intent, el
/// orquestador es dueño de la operación: cancelar el request HTTP no la cancela.
pub struct SubmitIntentUseCase {
    operation_repo: Arc<dyn OperationRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    executor: Arc<ExecuteOperationUseCase>,
}

impl SubmitIntentUseCase {
    pub fn new(
        operation_repo: Arc<dyn OperationRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        executor: Arc<ExecuteOperationUseCase>,
    ) -> Self {
        Self {
            operation_repo,
            wallet_repo,
            executor,
        }
    }

    /// Intent de MINT: el emisor crea la emisión, el destino la autoriza y el
    /// emisor paga. El emisor sale de la configuración del proceso; los campos
    /// de emisión están fijados internamente (AssetScale=0, TransferFee=0,
    /// MaximumAmount=amount).
    pub async fn mint(
        &self,
        idempotency_key: String,
        user_wallet_id: IdentityId,
        amount: Decimal,
        metadata: Option<String>,
    ) -> Result<IntentOutcome, OperationError> {
        let (operation, steps) =
            Operation::mint(idempotency_key, user_wallet_id.clone(), amount, metadata)?;

        // El executor necesita la dirección del destino para los pasos 2 y 3
        self.ensure_wallet_exists(&user_wallet_id).await?;

        self.materialize(operation, steps).await
    }

    /// Intent de TRANSFER: el receptor autoriza la emisión y el origen paga.
    pub async fn transfer(
        &self,
        idempotency_key: String,
        source_wallet_id: IdentityId,
        destination_wallet_id: IdentityId,
        issuance_id: String,
        amount: Decimal,
    ) -> Result<IntentOutcome, OperationError> {
        let (operation, steps) = Operation::transfer(
            idempotency_key,
            source_wallet_id.clone(),
            destination_wallet_id.clone(),
            issuance_id,
            amount,
        )?;

        self.ensure_wallet_exists(&source_wallet_id).await?;
        self.ensure_wallet_exists(&destination_wallet_id).await?;

        self.materialize(operation, steps).await
    }

    /// Intent de BURN: clawback del emisor sobre el holder.
    pub async fn burn(
        &self,
        idempotency_key: String,
        holder_wallet_id: IdentityId,
        issuance_id: String,
        amount: Decimal,
    ) -> Result<IntentOutcome, OperationError> {
        let (operation, steps) = Operation::burn(
            idempotency_key,
            holder_wallet_id.clone(),
            issuance_id,
            amount,
        )?;

        self.ensure_wallet_exists(&holder_wallet_id).await?;

        self.materialize(operation, steps).await
    }

    /// Contrato de idempotencia + insert atómico + arranque del executor.
    ///
    /// El chequeo y el insert no comparten transacción: la carrera entre dos
    /// intents idénticos concurrentes la resuelve la constraint única, y el
    /// perdedor se convierte en una relectura que descubre al ganador.
    async fn materialize(
        &self,
        operation: Operation,
        steps: Vec<OperationStep>,
    ) -> Result<IntentOutcome, OperationError> {
        if let Some(existing) = self
            .operation_repo
            .find_by_idempotency_key(&operation.idempotency_key)
            .await?
        {
            return self.replay(existing).await;
        }

        match self
            .operation_repo
            .create_with_steps(operation, steps.clone())
            .await
        {
            Ok(saved) => {
                info!(
                    "Operation {} accepted with {} steps ({:?})",
                    saved.id,
                    steps.len(),
                    saved.kind
                );
                self.spawn_executor(saved.id);
                Ok(IntentOutcome::Created(OperationDetails {
                    operation: saved,
                    steps,
                }))
            }
            Err(OperationError::DuplicateIdempotencyKey(key)) => {
                let existing = self
                    .operation_repo
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        OperationError::InvalidState(format!(
                            "idempotency winner vanished for key {}",
                            key
                        ))
                    })?;
                self.replay(existing).await
            }
            Err(e) => Err(e),
        }
    }

    async fn replay(&self, existing: Operation) -> Result<IntentOutcome, OperationError> {
        info!(
            "Idempotent replay for key {} resolves to operation {}",
            existing.idempotency_key, existing.id
        );

        // Vía de rescate tras un reinicio: una operación no terminal vuelve a
        // tener executor. La rutina de paso nunca re-submite un paso con hash,
        // así que un executor duplicado degenera en un segundo espectador
        if !existing.status.is_terminal() {
            self.spawn_executor(existing.id);
        }

        let steps = self.operation_repo.find_steps(existing.id).await?;
        Ok(IntentOutcome::Replayed(OperationDetails {
            operation: existing,
            steps,
        }))
    }

    fn spawn_executor(&self, operation_id: OperationId) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            match executor.execute(operation_id).await {
                Ok(()) => {}
                Err(OperationError::ValidationTimeout(step_no)) => {
                    warn!(
                        "Operation {} paused at step {} awaiting the validation poller",
                        operation_id, step_no
                    );
                }
                Err(e) => {
                    error!("Operation {} halted: {}", operation_id, e);
                }
            }
        });
    }

    async fn ensure_wallet_exists(&self, identity: &IdentityId) -> Result<(), OperationError> {
        let wallet = self
            .wallet_repo
            .find_by_id(identity.as_str())
            .await
            .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        if wallet.is_none() {
            return Err(OperationError::WalletNotFound(identity.to_string()));
        }
        Ok(())
    }
}
