use std::sync::Arc;

use crate::domain::entities::{Operation, OperationStep};
use crate::domain::error::OperationError;
use crate::domain::repository::OperationRepository;
use crate::domain::types::OperationId;

/// Caso de uso de consulta de estado de una operación.
pub struct GetOperationUseCase {
    operation_repo: Arc<dyn OperationRepository>,
}

impl GetOperationUseCase {
    pub fn new(operation_repo: Arc<dyn OperationRepository>) -> Self {
        Self { operation_repo }
    }

    /// Estado de la operación, con sus pasos salvo que el caller pida la
    /// variante liviana (`include_steps = false`).
    pub async fn execute(
        &self,
        id: OperationId,
        include_steps: bool,
    ) -> Result<(Operation, Option<Vec<OperationStep>>), OperationError> {
        let operation = self
            .operation_repo
            .find_by_id(id)
            .await?
            .ok_or(OperationError::NotFound(id))?;

        let steps = if include_steps {
            Some(self.operation_repo.find_steps(id).await?)
        } else {
            None
        };

        Ok((operation, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Operation;
    use crate::domain::repository::MockOperationRepository;
    use common::identity::IdentityId;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_status_only_skips_step_query() {
        let (operation, _) = Operation::burn(
            "key-1".to_string(),
            IdentityId::new("holder-1"),
            "ISS-1".to_string(),
            Decimal::from(5),
        )
        .unwrap();
        let operation_id = operation.id;

        let mut repo = MockOperationRepository::new();
        repo.expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(operation.clone())));
        // Sin expect_find_steps: la variante liviana no debe consultarlos

        let use_case = GetOperationUseCase::new(Arc::new(repo));
        let (_, steps) = use_case.execute(operation_id, false).await.unwrap();
        assert!(steps.is_none());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let mut repo = MockOperationRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let use_case = GetOperationUseCase::new(Arc::new(repo));
        let id = OperationId::new();
        assert_eq!(
            use_case.execute(id, true).await.unwrap_err(),
            OperationError::NotFound(id)
        );
    }
}
