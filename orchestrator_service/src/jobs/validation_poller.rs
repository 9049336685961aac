use common::redaction;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::gateways::{LedgerGateway, LookupStatus};
use crate::domain::repository::OperationRepository;
use crate::use_cases::execute_operation::{finalize_operation, record_validation_outcome};

/// Tamaño de lote por pasada del barrido.
const BATCH_SIZE: i64 = 10;

/// Job en segundo plano que rescata pasos cuya validación no llegó dentro de la
/// ventana inline.
///
/// Cada pasada toma hasta 10 pasos SUBMITTED o PENDING_VALIDATION con tx_hash
/// (los nunca chequeados primero), re-consulta el ledger y promueve los
/// desenlaces terminales, propagando la finalización a la operación contenedora.
/// No hay límite de reintentos ni backoff: cada fila se re-chequea al intervalo
/// fijo hasta quedar terminal. Los errores transitorios del adaptador se loguean
/// y la pasada continúa con la siguiente fila.
pub struct ValidationPollerJob {
    operation_repo: Arc<dyn OperationRepository>,
    ledger_gateway: Arc<dyn LedgerGateway>,
}

impl ValidationPollerJob {
    pub fn new(
        operation_repo: Arc<dyn OperationRepository>,
        ledger_gateway: Arc<dyn LedgerGateway>,
    ) -> Self {
        Self {
            operation_repo,
            ledger_gateway,
        }
    }

    /// Ejecuta una pasada del barrido.
    pub async fn run(&self) {
        let steps = match self
            .operation_repo
            .find_steps_awaiting_validation(BATCH_SIZE)
            .await
        {
            Ok(steps) => steps,
            Err(e) => {
                error!("Failed to fetch steps awaiting validation: {:?}", e);
                return;
            }
        };

        if steps.is_empty() {
            return;
        }

        info!("Found {} steps awaiting validation. Sweeping...", steps.len());

        for step in steps {
            let Some(tx_hash) = step.tx_hash.clone() else {
                continue;
            };

            match self.ledger_gateway.lookup(&tx_hash).await {
                Ok(LookupStatus::Found {
                    validated: true,
                    transaction_result,
                    metadata,
                }) => {
                    let operation = match self.operation_repo.find_by_id(step.operation_id).await {
                        Ok(Some(operation)) => operation,
                        Ok(None) => {
                            warn!(
                                "Step {} references missing operation {}; skipping",
                                step.id, step.operation_id
                            );
                            continue;
                        }
                        Err(e) => {
                            error!("Failed to load operation {}: {:?}", step.operation_id, e);
                            continue;
                        }
                    };

                    let transaction_result =
                        transaction_result.unwrap_or_else(|| "unknown".to_string());
                    info!(
                        "Step {} of operation {} validated with {}: {}",
                        step.step_no,
                        operation.id,
                        transaction_result,
                        redaction::guard(&metadata)
                    );

                    match record_validation_outcome(
                        self.operation_repo.as_ref(),
                        &operation,
                        &step,
                        &transaction_result,
                        &metadata,
                    )
                    .await
                    {
                        Ok(_) => {
                            if let Err(e) =
                                finalize_operation(self.operation_repo.as_ref(), operation.id)
                                    .await
                            {
                                error!(
                                    "Failed to finalize operation {} after step {}: {:?}",
                                    operation.id, step.step_no, e
                                );
                            }
                        }
                        Err(e) => {
                            error!(
                                "Failed to record validation outcome for step {}: {:?}",
                                step.id, e
                            );
                        }
                    }
                }
                Ok(_) => {
                    // Todavía no está en un ledger validado: solo actualizamos
                    // la marca de chequeo para rotar la cola del barrido
                    if let Err(e) = self.operation_repo.touch_step_checked(step.id).await {
                        error!("Failed to touch step {}: {:?}", step.id, e);
                    }
                }
                Err(e) => {
                    // Transitorio: se reintenta en la próxima pasada
                    warn!("Lookup failed for {} (step {}): {}", tx_hash, step.id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Operation, OperationStatus, StepStatus};
    use crate::domain::gateways::MockLedgerGateway;
    use crate::domain::repository::MockOperationRepository;
    use common::identity::IdentityId;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn transfer_fixture() -> (Operation, Vec<crate::domain::entities::OperationStep>) {
        Operation::transfer(
            "key-1".to_string(),
            IdentityId::new("wallet-a"),
            IdentityId::new("wallet-b"),
            "ISS-1".to_string(),
            Decimal::from(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_not_yet_validated_only_touches_the_step() {
        let (_, mut steps) = transfer_fixture();
        steps[0].status = StepStatus::PENDING_VALIDATION;
        steps[0].tx_hash = Some("HASH-1".to_string());
        let step_id = steps[0].id;
        let sweep = vec![steps[0].clone()];

        let mut repo = MockOperationRepository::new();
        repo.expect_find_steps_awaiting_validation()
            .returning(move |_| Ok(sweep.clone()));
        repo.expect_touch_step_checked()
            .with(eq(step_id))
            .times(1)
            .returning(|_| Ok(()));

        let mut gateway = MockLedgerGateway::new();
        gateway
            .expect_lookup()
            .returning(|_| Ok(LookupStatus::NotFound));

        let poller = ValidationPollerJob::new(Arc::new(repo), Arc::new(gateway));
        poller.run().await;
    }

    #[tokio::test]
    async fn test_validated_success_promotes_step_and_operation() {
        let (mut operation, mut steps) = transfer_fixture();
        operation.status = OperationStatus::IN_PROGRESS;

        // El paso 2 está pendiente de validación; el 1 ya validó
        steps[0].status = StepStatus::VALIDATED_SUCCESS;
        steps[1].status = StepStatus::PENDING_VALIDATION;
        steps[1].tx_hash = Some("HASH-2".to_string());

        let operation_id = operation.id;
        let step_id = steps[1].id;
        let sweep = vec![steps[1].clone()];

        let mut repo = MockOperationRepository::new();
        repo.expect_find_steps_awaiting_validation()
            .returning(move |_| Ok(sweep.clone()));
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(operation.clone())));
        repo.expect_mark_step_validated()
            .withf(move |id, status, _| {
                *id == step_id && *status == StepStatus::VALIDATED_SUCCESS
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        {
            // Para la finalización, ambos pasos ya se ven validados
            let mut steps = steps.clone();
            steps[1].status = StepStatus::VALIDATED_SUCCESS;
            repo.expect_find_steps()
                .returning(move |_| Ok(steps.clone()));
        }
        repo.expect_update_operation_status()
            .withf(move |id, status, _, _| {
                *id == operation_id && *status == OperationStatus::SUCCESS
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut gateway = MockLedgerGateway::new();
        gateway.expect_lookup().with(eq("HASH-2")).returning(|_| {
            Ok(LookupStatus::Found {
                validated: true,
                transaction_result: Some("tesSUCCESS".to_string()),
                metadata: json!({ "TransactionResult": "tesSUCCESS" }),
            })
        });

        let poller = ValidationPollerJob::new(Arc::new(repo), Arc::new(gateway));
        poller.run().await;
    }

    #[tokio::test]
    async fn test_validated_failure_fails_the_operation_naming_the_step() {
        let (mut operation, mut steps) = transfer_fixture();
        operation.status = OperationStatus::IN_PROGRESS;
        steps[0].status = StepStatus::PENDING_VALIDATION;
        steps[0].tx_hash = Some("HASH-1".to_string());

        let step_id = steps[0].id;
        let sweep = vec![steps[0].clone()];

        let mut repo = MockOperationRepository::new();
        repo.expect_find_steps_awaiting_validation()
            .returning(move |_| Ok(sweep.clone()));
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(operation.clone())));
        repo.expect_mark_step_validated()
            .withf(move |id, status, _| {
                *id == step_id && *status == StepStatus::VALIDATED_FAILED
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        {
            let mut steps = steps.clone();
            steps[0].status = StepStatus::VALIDATED_FAILED;
            steps[0].validated_result = Some(json!({ "TransactionResult": "tecPATH_DRY" }));
            repo.expect_find_steps()
                .returning(move |_| Ok(steps.clone()));
        }
        repo.expect_update_operation_status()
            .withf(|_, status, _, message| {
                *status == OperationStatus::FAILED
                    && message
                        .as_deref()
                        .map(|m| m.contains("step 1") && m.contains("tecPATH_DRY"))
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut gateway = MockLedgerGateway::new();
        gateway.expect_lookup().returning(|_| {
            Ok(LookupStatus::Found {
                validated: true,
                transaction_result: Some("tecPATH_DRY".to_string()),
                metadata: json!({ "TransactionResult": "tecPATH_DRY" }),
            })
        });

        let poller = ValidationPollerJob::new(Arc::new(repo), Arc::new(gateway));
        poller.run().await;
    }

    #[tokio::test]
    async fn test_transient_lookup_error_continues_the_pass() {
        let (_, mut steps) = transfer_fixture();
        steps[0].status = StepStatus::PENDING_VALIDATION;
        steps[0].tx_hash = Some("HASH-1".to_string());
        let sweep = vec![steps[0].clone()];

        let mut repo = MockOperationRepository::new();
        repo.expect_find_steps_awaiting_validation()
            .returning(move |_| Ok(sweep.clone()));
        // Sin más expectations: un error transitorio no escribe nada

        let mut gateway = MockLedgerGateway::new();
        gateway.expect_lookup().returning(|_| {
            Err(crate::domain::error::LedgerError::Connection(
                "connection reset".to_string(),
            ))
        });

        let poller = ValidationPollerJob::new(Arc::new(repo), Arc::new(gateway));
        poller.run().await;
    }
}
