use crate::domain::entities::{Operation, OperationStatus, OperationStep, StepStatus};
use crate::domain::error::OperationError;
use crate::domain::repository::OperationRepository;
use crate::domain::types::{OperationId, StepId};
use crate::infrastructure::persistence::models::{OperationModel, OperationStepModel};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

/// Repositorio de operaciones implementado para PostgreSQL.
///
/// Utiliza consultas SQL parametrizadas directas con `sqlx` (Runtime-checked).
/// Las transiciones de estado llevan su guarda en el propio WHERE para que la
/// monotonicidad se sostenga incluso con ejecutores concurrentes: una operación
/// terminal o un paso ya validado nunca se reescriben.
pub struct PostgresOperationRepository {
    pool: PgPool,
}

impl PostgresOperationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationRepository for PostgresOperationRepository {
    /// Inserta la operación y todos sus pasos en una única transacción SQL.
    ///
    /// El choque con la constraint única de `idempotency_key` se detecta por el
    /// nombre de la constraint y se reporta como `DuplicateIdempotencyKey`, que
    /// el front-door resuelve releyendo al ganador de la carrera.
    async fn create_with_steps(
        &self,
        operation: Operation,
        steps: Vec<OperationStep>,
    ) -> Result<Operation, OperationError> {
        let model = OperationModel::from(&operation);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        let saved_model = sqlx::query_as::<_, OperationModel>(
            r#"
            INSERT INTO operations (
                id, kind, idempotency_key, issuance_id, source_wallet_id,
                destination_wallet_id, amount, metadata, status, error_code,
                error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(model.id)
        .bind(model.kind)
        .bind(model.idempotency_key)
        .bind(model.issuance_id)
        .bind(model.source_wallet_id)
        .bind(model.destination_wallet_id)
        .bind(model.amount)
        .bind(model.metadata)
        .bind(model.status)
        .bind(model.error_code)
        .bind(model.error_message)
        .bind(model.created_at)
        .bind(model.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("operations_idempotency_key_key") {
                OperationError::DuplicateIdempotencyKey(operation.idempotency_key.clone())
            } else {
                OperationError::RepositoryError(e.to_string())
            }
        })?;

        for step in &steps {
            let step_model = OperationStepModel::from(step);
            sqlx::query(
                r#"
                INSERT INTO operation_steps (
                    id, operation_id, step_no, kind, signer_wallet_id,
                    ledger_tx_type, tx_hash, submit_result, validated_result,
                    status, last_checked_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(step_model.id)
            .bind(step_model.operation_id)
            .bind(step_model.step_no)
            .bind(step_model.kind)
            .bind(step_model.signer_wallet_id)
            .bind(step_model.ledger_tx_type)
            .bind(step_model.tx_hash)
            .bind(step_model.submit_result)
            .bind(step_model.validated_result)
            .bind(step_model.status)
            .bind(step_model.last_checked_at)
            .bind(step_model.created_at)
            .bind(step_model.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| OperationError::RepositoryError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(saved_model.into())
    }

    async fn find_by_id(&self, id: OperationId) -> Result<Option<Operation>, OperationError> {
        let model_opt =
            sqlx::query_as::<_, OperationModel>(r#"SELECT * FROM operations WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }

    /// Búsqueda por token de idempotencia (índice único).
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Operation>, OperationError> {
        let model_opt = sqlx::query_as::<_, OperationModel>(
            r#"SELECT * FROM operations WHERE idempotency_key = $1"#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }

    async fn find_steps(
        &self,
        operation_id: OperationId,
    ) -> Result<Vec<OperationStep>, OperationError> {
        let models = sqlx::query_as::<_, OperationStepModel>(
            r#"
            SELECT * FROM operation_steps
            WHERE operation_id = $1
            ORDER BY step_no ASC
            "#,
        )
        .bind(operation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn find_step(&self, id: StepId) -> Result<Option<OperationStep>, OperationError> {
        let model_opt = sqlx::query_as::<_, OperationStepModel>(
            r#"SELECT * FROM operation_steps WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operations
            SET status = $1, error_code = $2, error_message = $3, updated_at = now()
            WHERE id = $4 AND status NOT IN ('SUCCESS', 'FAILED')
            "#,
        )
        .bind(status)
        .bind(error_code)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    async fn set_issuance_id(
        &self,
        id: OperationId,
        issuance_id: &str,
    ) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operations
            SET issuance_id = $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(issuance_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    async fn mark_step_submitted(
        &self,
        id: StepId,
        tx_hash: &str,
        submit_result: Value,
    ) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operation_steps
            SET tx_hash = $1, submit_result = $2, status = 'SUBMITTED', updated_at = now()
            WHERE id = $3 AND status = 'PENDING'
            "#,
        )
        .bind(tx_hash)
        .bind(submit_result)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    async fn mark_step_pending_validation(&self, id: StepId) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operation_steps
            SET status = 'PENDING_VALIDATION', updated_at = now()
            WHERE id = $1 AND status = 'SUBMITTED'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    async fn mark_step_validated(
        &self,
        id: StepId,
        status: StepStatus,
        validated_result: Value,
    ) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operation_steps
            SET status = $1, validated_result = $2, last_checked_at = now(), updated_at = now()
            WHERE id = $3 AND status IN ('SUBMITTED', 'PENDING_VALIDATION')
            "#,
        )
        .bind(status)
        .bind(validated_result)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    async fn touch_step_checked(&self, id: StepId) -> Result<(), OperationError> {
        sqlx::query(
            r#"
            UPDATE operation_steps
            SET last_checked_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(())
    }

    /// Candidatos del barrido del poller. Incluye SUBMITTED además de
    /// PENDING_VALIDATION para no dejar huérfano un paso si el proceso murió
    /// entre el submit y el comienzo de la espera de validación.
    async fn find_steps_awaiting_validation(
        &self,
        limit: i64,
    ) -> Result<Vec<OperationStep>, OperationError> {
        let models = sqlx::query_as::<_, OperationStepModel>(
            r#"
            SELECT * FROM operation_steps
            WHERE status IN ('SUBMITTED', 'PENDING_VALIDATION') AND tx_hash IS NOT NULL
            ORDER BY last_checked_at ASC NULLS FIRST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OperationError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }
}
