use common::identity::IdentityId;
use common::redaction;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::domain::entities::{
    classify_transaction_result, extract_issuance_id, step_kind, Operation, OperationKind,
    OperationStatus, OperationStep, StepStatus,
};
use crate::domain::error::OperationError;
use crate::domain::gateways::{LedgerGateway, LedgerTx, LookupStatus};
use crate::domain::repository::{OperationRepository, WalletRepository};
use crate::domain::secrets::SecretStore;
use crate::domain::types::OperationId;
use crate::infrastructure::signer_locks::SignerLocks;

/// Flags de emisión: CanTransfer | CanClawback.
const MPT_ISSUANCE_FLAGS: u32 = 96;

/// Parámetros de la espera de validación inline.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub inline_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            inline_timeout: Duration::from_secs(15),
        }
    }
}

enum WaitOutcome {
    Validated {
        transaction_result: String,
        metadata: Value,
    },
    TimedOut,
}

/// Caso de uso central: el step executor.
///
/// Dado el id de una operación, recorre sus pasos en orden estricto de
/// `step_no`, saltando los ya VALIDATED_SUCCESS (punto de reanudación tras un
/// reinicio), y para cada paso restante ejecuta submit → espera de validación
/// acotada → registro durable. Computa el estado final de la operación.
///
/// Garantías que este tipo sostiene:
/// * el paso n+1 no comienza hasta que el paso n quedó VALIDATED_SUCCESS;
/// * a lo sumo un submit en vuelo por identidad firmante (vía `SignerLocks`);
/// * un paso con tx_hash registrado jamás se vuelve a submitir;
/// * un timeout inline deja el paso en PENDING_VALIDATION y la operación en
///   IN_PROGRESS; el poller es quien finaliza.
pub struct ExecuteOperationUseCase {
    operation_repo: Arc<dyn OperationRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    secret_store: Arc<dyn SecretStore>,
    ledger_gateway: Arc<dyn LedgerGateway>,
    signer_locks: Arc<SignerLocks>,
    config: ExecutorConfig,
}

impl ExecuteOperationUseCase {
    pub fn new(
        operation_repo: Arc<dyn OperationRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        secret_store: Arc<dyn SecretStore>,
        ledger_gateway: Arc<dyn LedgerGateway>,
        signer_locks: Arc<SignerLocks>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            operation_repo,
            wallet_repo,
            secret_store,
            ledger_gateway,
            signer_locks,
            config,
        }
    }

    pub async fn execute(&self, operation_id: OperationId) -> Result<(), OperationError> {
        let operation = self
            .operation_repo
            .find_by_id(operation_id)
            .await?
            .ok_or(OperationError::NotFound(operation_id))?;

        if operation.status.is_terminal() {
            return Ok(());
        }

        self.operation_repo
            .update_operation_status(operation_id, OperationStatus::IN_PROGRESS, None, None)
            .await?;

        let steps = self.operation_repo.find_steps(operation_id).await?;

        for step in steps {
            // Punto de reanudación: lo ya validado con éxito no se repite
            if step.status == StepStatus::VALIDATED_SUCCESS {
                continue;
            }

            // Releemos la operación en cada iteración: el paso 1 de un MINT
            // persiste issuance_id y los pasos siguientes lo necesitan
            let operation = self
                .operation_repo
                .find_by_id(operation_id)
                .await?
                .ok_or(OperationError::NotFound(operation_id))?;

            let run_result = self.run_step(&operation, &step).await;

            let current = self
                .operation_repo
                .find_step(step.id)
                .await?
                .ok_or_else(|| {
                    OperationError::InvalidState(format!("step {} disappeared", step.id))
                })?;

            match current.status {
                StepStatus::VALIDATED_SUCCESS => continue,
                StepStatus::VALIDATED_FAILED => {
                    finalize_operation(self.operation_repo.as_ref(), operation_id).await?;
                    let result = transaction_result_of(&current);
                    return Err(OperationError::StepFailed {
                        step_no: current.step_no,
                        result,
                    });
                }
                StepStatus::PENDING_VALIDATION if run_result.is_ok() => {
                    warn!(
                        "Inline validation wait expired for operation {} step {}; poller will finalize",
                        operation_id, current.step_no
                    );
                    return Err(OperationError::ValidationTimeout(current.step_no));
                }
                _ => {
                    // Error duro antes o durante el submit: la operación falla
                    // con un mensaje que nombra el paso; el paso conserva su
                    // último estado persistido
                    let err = run_result.err().unwrap_or_else(|| {
                        OperationError::InvalidState(format!(
                            "step {} stalled in {:?}",
                            current.step_no, current.status
                        ))
                    });
                    self.operation_repo
                        .update_operation_status(
                            operation_id,
                            OperationStatus::FAILED,
                            Some("STEP_ERROR".to_string()),
                            Some(format!(
                                "step {} could not be processed: {}",
                                current.step_no, err
                            )),
                        )
                        .await?;
                    return Err(err);
                }
            }
        }

        finalize_operation(self.operation_repo.as_ref(), operation_id).await?;
        info!("Operation {} completed all steps", operation_id);
        Ok(())
    }

    /// Rutina de un paso: resolver seed, armar payload, submit bajo el lock del
    /// firmante, espera de validación acotada y registro del desenlace.
    async fn run_step(
        &self,
        operation: &Operation,
        step: &OperationStep,
    ) -> Result<(), OperationError> {
        // Lectura fresca: otro executor de la misma operación pudo avanzarlo
        let mut current = self.require_step(step).await?;
        if current.status.is_terminal() {
            return Ok(());
        }

        if current.tx_hash.is_none() {
            let signer = current.signer_wallet_id.clone().ok_or_else(|| {
                OperationError::InvalidState(format!("step {} has no signer", current.step_no))
            })?;

            let seed = self
                .secret_store
                .fetch_seed(&signer)
                .await
                .map_err(|e| OperationError::SecretError(e.to_string()))?;
            let tx = self.build_step_tx(operation, &current).await?;

            let guard = self.signer_locks.acquire(&signer).await;

            // Re-chequeo bajo el lock: un paso con hash jamás se re-submite
            current = self.require_step(step).await?;
            if current.tx_hash.is_none() {
                // La secuencia de cuenta se lee en prepare, por eso el
                // autofill también ocurre bajo el lock
                let prepared = self
                    .ledger_gateway
                    .prepare(tx)
                    .await
                    .map_err(|e| OperationError::GatewayError(e.to_string()))?;
                let signed = self
                    .ledger_gateway
                    .sign(&prepared, &seed)
                    .await
                    .map_err(|e| OperationError::GatewayError(e.to_string()))?;
                let ack = self
                    .ledger_gateway
                    .submit(&signed.tx_blob)
                    .await
                    .map_err(|e| OperationError::GatewayError(e.to_string()))?;

                info!(
                    "Operation {} step {} submitted as {}: {}",
                    operation.id,
                    current.step_no,
                    ack.tx_hash,
                    redaction::guard(&ack.raw)
                );

                self.operation_repo
                    .mark_step_submitted(step.id, &ack.tx_hash, ack.raw.clone())
                    .await?;
                current.tx_hash = Some(ack.tx_hash);
            }

            // El firmante queda libre durante la espera de validación
            drop(guard);
        }

        let tx_hash = current.tx_hash.clone().ok_or_else(|| {
            OperationError::InvalidState(format!("step {} has no tx hash", current.step_no))
        })?;

        self.operation_repo
            .mark_step_pending_validation(step.id)
            .await?;

        match self.wait_for_validation(&tx_hash).await {
            WaitOutcome::Validated {
                transaction_result,
                metadata,
            } => {
                record_validation_outcome(
                    self.operation_repo.as_ref(),
                    operation,
                    &current,
                    &transaction_result,
                    &metadata,
                )
                .await?;
            }
            WaitOutcome::TimedOut => {
                // El paso queda en PENDING_VALIDATION; lo finaliza el poller
            }
        }

        Ok(())
    }

    /// Espera de validación acotada: lookup cada `poll_interval` hasta agotar
    /// `inline_timeout`. "Not found" y "aún no validada" son señales normales;
    /// cualquier otro error del adaptador se loguea y se trata como transitorio
    /// dentro de la ventana.
    async fn wait_for_validation(&self, tx_hash: &str) -> WaitOutcome {
        let deadline = Instant::now() + self.config.inline_timeout;

        loop {
            match self.ledger_gateway.lookup(tx_hash).await {
                Ok(LookupStatus::Found {
                    validated: true,
                    transaction_result,
                    metadata,
                }) => {
                    return WaitOutcome::Validated {
                        transaction_result: transaction_result
                            .unwrap_or_else(|| "unknown".to_string()),
                        metadata,
                    };
                }
                Ok(_) => {
                    // todavía no está en un ledger validado
                }
                Err(e) => {
                    warn!("Transient lookup failure for {}: {}", tx_hash, e);
                }
            }

            if Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Payload de ledger según el rol del paso (recetas por tipo de operación).
    async fn build_step_tx(
        &self,
        operation: &Operation,
        step: &OperationStep,
    ) -> Result<LedgerTx, OperationError> {
        let signer = step.signer_wallet_id.as_ref().ok_or_else(|| {
            OperationError::InvalidState(format!("step {} has no signer", step.step_no))
        })?;
        let signer_address = self.resolve_address(signer).await?;

        let fields = match step.kind.as_str() {
            step_kind::ISSUER_MINT => {
                let mut fields = json!({
                    "Account": signer_address,
                    "Flags": MPT_ISSUANCE_FLAGS,
                    "AssetScale": 0,
                    "TransferFee": 0,
                    "MaximumAmount": operation.amount.to_string(),
                });
                if let Some(metadata) = &operation.metadata {
                    fields.as_object_mut().unwrap().insert(
                        "MPTokenMetadata".to_string(),
                        json!(hex::encode_upper(metadata.as_bytes())),
                    );
                }
                fields
            }
            step_kind::USER_AUTHORIZE | step_kind::RECEIVER_AUTHORIZE => json!({
                "Account": signer_address,
                "MPTokenIssuanceID": require_issuance(operation)?,
            }),
            step_kind::ISSUER_TRANSFER | step_kind::SENDER_TRANSFER => {
                let destination = operation.destination_wallet_id.as_ref().ok_or_else(|| {
                    OperationError::InvalidState(format!(
                        "payment step {} has no destination",
                        step.step_no
                    ))
                })?;
                let destination_address = self.resolve_address(destination).await?;
                json!({
                    "Account": signer_address,
                    "Destination": destination_address,
                    "Amount": {
                        "mpt_issuance_id": require_issuance(operation)?,
                        "value": operation.amount.to_string(),
                    },
                })
            }
            step_kind::ISSUER_CLAWBACK => {
                let holder = operation.destination_wallet_id.as_ref().ok_or_else(|| {
                    OperationError::InvalidState(format!(
                        "clawback step {} has no holder",
                        step.step_no
                    ))
                })?;
                let holder_address = self.resolve_address(holder).await?;
                json!({
                    "Account": signer_address,
                    "Holder": holder_address,
                    "Amount": {
                        "mpt_issuance_id": require_issuance(operation)?,
                        "value": operation.amount.to_string(),
                    },
                })
            }
            other => {
                return Err(OperationError::InvalidState(format!(
                    "unknown step kind: {}",
                    other
                )))
            }
        };

        Ok(LedgerTx {
            tx_type: step.ledger_tx_type.clone(),
            fields,
        })
    }

    /// Dirección de ledger de una identidad: la del emisor se deriva del seed
    /// configurado; la de un usuario sale de su fila de wallet.
    async fn resolve_address(&self, identity: &IdentityId) -> Result<String, OperationError> {
        if identity.is_issuer() {
            let seed = self
                .secret_store
                .fetch_seed(identity)
                .await
                .map_err(|e| OperationError::SecretError(e.to_string()))?;
            return self
                .ledger_gateway
                .derive_address(&seed)
                .await
                .map_err(|e| OperationError::GatewayError(e.to_string()));
        }

        let wallet = self
            .wallet_repo
            .find_by_id(identity.as_str())
            .await
            .map_err(|e| OperationError::RepositoryError(e.to_string()))?
            .ok_or_else(|| OperationError::WalletNotFound(identity.to_string()))?;

        Ok(wallet.address)
    }

    async fn require_step(&self, step: &OperationStep) -> Result<OperationStep, OperationError> {
        self.operation_repo
            .find_step(step.id)
            .await?
            .ok_or_else(|| OperationError::InvalidState(format!("step {} disappeared", step.id)))
    }
}

fn require_issuance(operation: &Operation) -> Result<String, OperationError> {
    operation.issuance_id.clone().ok_or_else(|| {
        OperationError::InvalidState(format!("operation {} has no issuance id", operation.id))
    })
}

fn transaction_result_of(step: &OperationStep) -> String {
    step.validated_result
        .as_ref()
        .and_then(|v| v.get("TransactionResult"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Registra el desenlace validado de un paso. Compartida entre el executor y el
/// poller para que la clasificación y el descubrimiento de emisión (MINT paso 1)
/// se comporten igual por ambas vías.
pub(crate) async fn record_validation_outcome(
    repo: &dyn OperationRepository,
    operation: &Operation,
    step: &OperationStep,
    transaction_result: &str,
    metadata: &Value,
) -> Result<StepStatus, OperationError> {
    let mut status = classify_transaction_result(transaction_result);

    if status == StepStatus::VALIDATED_SUCCESS
        && operation.kind == OperationKind::MINT
        && step.step_no == 1
    {
        match extract_issuance_id(metadata) {
            Some(issuance_id) => {
                repo.set_issuance_id(operation.id, &issuance_id).await?;
                info!(
                    "Operation {} discovered issuance id {}",
                    operation.id, issuance_id
                );
            }
            None => {
                // El ledger validó pero la metadata no trae el identificador:
                // sin él los pasos 2 y 3 son inconstruibles
                warn!(
                    "Validated issuance-create for operation {} is missing mpt_issuance_id",
                    operation.id
                );
                status = StepStatus::VALIDATED_FAILED;
            }
        }
    }

    repo.mark_step_validated(step.id, status, metadata.clone())
        .await?;
    Ok(status)
}

/// Recalcula el estado de la operación a partir de sus pasos: cualquier
/// VALIDATED_FAILED la marca FAILED nombrando el paso; todos VALIDATED_SUCCESS
/// la marca SUCCESS; cualquier otra combinación la deja como está.
pub(crate) async fn finalize_operation(
    repo: &dyn OperationRepository,
    operation_id: OperationId,
) -> Result<(), OperationError> {
    let steps = repo.find_steps(operation_id).await?;

    if let Some(failed) = steps
        .iter()
        .find(|s| s.status == StepStatus::VALIDATED_FAILED)
    {
        let result = transaction_result_of(failed);
        repo.update_operation_status(
            operation_id,
            OperationStatus::FAILED,
            Some("STEP_FAILED".to_string()),
            Some(format!(
                "step {} failed ledger validation with result {}",
                failed.step_no, result
            )),
        )
        .await?;
    } else if !steps.is_empty()
        && steps
            .iter()
            .all(|s| s.status == StepStatus::VALIDATED_SUCCESS)
    {
        repo.update_operation_status(operation_id, OperationStatus::SUCCESS, None, None)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Operation;
    use crate::domain::gateways::MockLedgerGateway;
    use crate::domain::repository::{MockOperationRepository, MockWalletRepository};
    use crate::domain::secrets::MockSecretStore;
    use rust_decimal::Decimal;

    fn executor_with(repo: MockOperationRepository) -> ExecuteOperationUseCase {
        ExecuteOperationUseCase::new(
            Arc::new(repo),
            Arc::new(MockWalletRepository::new()),
            Arc::new(MockSecretStore::new()),
            Arc::new(MockLedgerGateway::new()),
            Arc::new(SignerLocks::new()),
            ExecutorConfig::default(),
        )
    }

    fn mint_fixture() -> (Operation, Vec<OperationStep>) {
        Operation::mint(
            "key-1".to_string(),
            IdentityId::new("wallet-a"),
            Decimal::from(1000),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_terminal_operation_is_not_reexecuted() {
        let (mut operation, _) = mint_fixture();
        operation.status = OperationStatus::SUCCESS;
        let operation_id = operation.id;

        let mut repo = MockOperationRepository::new();
        repo.expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(operation.clone())));
        // Sin más expectations: cualquier otro acceso haría fallar el test

        let executor = executor_with(repo);
        assert!(executor.execute(operation_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_all_steps_validated_marks_operation_success() {
        let (operation, mut steps) = mint_fixture();
        let operation_id = operation.id;
        for step in &mut steps {
            step.status = StepStatus::VALIDATED_SUCCESS;
        }

        let mut repo = MockOperationRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(operation.clone())));
        {
            let steps = steps.clone();
            repo.expect_find_steps()
                .returning(move |_| Ok(steps.clone()));
        }
        repo.expect_update_operation_status()
            .withf(|_, status, _, _| *status == OperationStatus::IN_PROGRESS)
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        repo.expect_update_operation_status()
            .withf(|_, status, _, _| *status == OperationStatus::SUCCESS)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let executor = executor_with(repo);
        assert!(executor.execute(operation_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_step_halts_and_names_the_step() {
        let (operation, mut steps) = mint_fixture();
        let operation_id = operation.id;
        steps[0].status = StepStatus::VALIDATED_FAILED;
        steps[0].validated_result =
            Some(serde_json::json!({ "TransactionResult": "tecNO_AUTH" }));
        let failed_step = steps[0].clone();

        let mut repo = MockOperationRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(operation.clone())));
        {
            let steps = steps.clone();
            repo.expect_find_steps()
                .returning(move |_| Ok(steps.clone()));
        }
        repo.expect_find_step()
            .returning(move |_| Ok(Some(failed_step.clone())));
        repo.expect_update_operation_status()
            .withf(|_, status, _, _| *status == OperationStatus::IN_PROGRESS)
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        repo.expect_update_operation_status()
            .withf(|_, status, _, message| {
                *status == OperationStatus::FAILED
                    && message
                        .as_deref()
                        .map(|m| m.contains("step 1") && m.contains("tecNO_AUTH"))
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let executor = executor_with(repo);
        let result = executor.execute(operation_id).await;

        assert_eq!(
            result.unwrap_err(),
            OperationError::StepFailed {
                step_no: 1,
                result: "tecNO_AUTH".to_string()
            }
        );
    }
}
