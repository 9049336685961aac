//! Infraestructura en memoria para la suite de escenarios: repositorios fake
//! con la misma semántica de guardas que los de PostgreSQL, más un harness que
//! cablea los casos de uso reales contra el gateway stub.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchestrator_service::api::http_routes::AppState;
use orchestrator_service::domain::entities::{
    Operation, OperationStatus, OperationStep, StepStatus, Wallet,
};
use orchestrator_service::domain::error::{OperationError, WalletError};
use orchestrator_service::domain::repository::{OperationRepository, WalletRepository};
use orchestrator_service::domain::types::{OperationId, StepId};
use orchestrator_service::infrastructure::crypto::SeedCipher;
use orchestrator_service::infrastructure::gateways::stub_ledger_gateway::StubLedgerGateway;
use orchestrator_service::infrastructure::secret_store::CachedSecretStore;
use orchestrator_service::infrastructure::signer_locks::SignerLocks;
use orchestrator_service::jobs::validation_poller::ValidationPollerJob;
use orchestrator_service::use_cases::create_wallet::CreateWalletUseCase;
use orchestrator_service::use_cases::execute_operation::{
    ExecuteOperationUseCase, ExecutorConfig,
};
use orchestrator_service::use_cases::fund_wallet::FundWalletUseCase;
use orchestrator_service::use_cases::get_operation::GetOperationUseCase;
use orchestrator_service::use_cases::get_wallet::GetWalletUseCase;
use orchestrator_service::use_cases::submit_intent::SubmitIntentUseCase;

/// Seed del emisor para los tests. El stub deriva su dirección de forma estable.
pub const ISSUER_SEED: &str = "sEdStubSeedIssuer";

#[derive(Default)]
pub struct InMemoryOperationRepository {
    operations: Mutex<HashMap<OperationId, Operation>>,
    steps: Mutex<HashMap<StepId, OperationStep>>,
}

impl InMemoryOperationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.lock().unwrap().len()
    }
}

#[async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn create_with_steps(
        &self,
        operation: Operation,
        steps: Vec<OperationStep>,
    ) -> Result<Operation, OperationError> {
        let mut operations = self.operations.lock().unwrap();
        if operations
            .values()
            .any(|o| o.idempotency_key == operation.idempotency_key)
        {
            return Err(OperationError::DuplicateIdempotencyKey(
                operation.idempotency_key.clone(),
            ));
        }

        operations.insert(operation.id, operation.clone());
        let mut stored_steps = self.steps.lock().unwrap();
        for step in steps {
            stored_steps.insert(step.id, step);
        }

        Ok(operation)
    }

    async fn find_by_id(&self, id: OperationId) -> Result<Option<Operation>, OperationError> {
        Ok(self.operations.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Operation>, OperationError> {
        Ok(self
            .operations
            .lock()
            .unwrap()
            .values()
            .find(|o| o.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn find_steps(
        &self,
        operation_id: OperationId,
    ) -> Result<Vec<OperationStep>, OperationError> {
        let mut steps: Vec<OperationStep> = self
            .steps
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.operation_id == operation_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_no);
        Ok(steps)
    }

    async fn find_step(&self, id: StepId) -> Result<Option<OperationStep>, OperationError> {
        Ok(self.steps.lock().unwrap().get(&id).cloned())
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> Result<(), OperationError> {
        let mut operations = self.operations.lock().unwrap();
        if let Some(operation) = operations.get_mut(&id) {
            // Misma guarda que el WHERE del repositorio Postgres
            if !operation.status.is_terminal() {
                operation.status = status;
                operation.error_code = error_code;
                operation.error_message = error_message;
                operation.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn set_issuance_id(
        &self,
        id: OperationId,
        issuance_id: &str,
    ) -> Result<(), OperationError> {
        if let Some(operation) = self.operations.lock().unwrap().get_mut(&id) {
            operation.issuance_id = Some(issuance_id.to_string());
            operation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_step_submitted(
        &self,
        id: StepId,
        tx_hash: &str,
        submit_result: Value,
    ) -> Result<(), OperationError> {
        if let Some(step) = self.steps.lock().unwrap().get_mut(&id) {
            if step.status == StepStatus::PENDING {
                step.tx_hash = Some(tx_hash.to_string());
                step.submit_result = Some(submit_result);
                step.status = StepStatus::SUBMITTED;
                step.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_step_pending_validation(&self, id: StepId) -> Result<(), OperationError> {
        if let Some(step) = self.steps.lock().unwrap().get_mut(&id) {
            if step.status == StepStatus::SUBMITTED {
                step.status = StepStatus::PENDING_VALIDATION;
                step.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_step_validated(
        &self,
        id: StepId,
        status: StepStatus,
        validated_result: Value,
    ) -> Result<(), OperationError> {
        if let Some(step) = self.steps.lock().unwrap().get_mut(&id) {
            if matches!(
                step.status,
                StepStatus::SUBMITTED | StepStatus::PENDING_VALIDATION
            ) {
                step.status = status;
                step.validated_result = Some(validated_result);
                step.last_checked_at = Some(Utc::now());
                step.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn touch_step_checked(&self, id: StepId) -> Result<(), OperationError> {
        if let Some(step) = self.steps.lock().unwrap().get_mut(&id) {
            step.last_checked_at = Some(Utc::now());
            step.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_steps_awaiting_validation(
        &self,
        limit: i64,
    ) -> Result<Vec<OperationStep>, OperationError> {
        let mut steps: Vec<OperationStep> = self
            .steps
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    StepStatus::SUBMITTED | StepStatus::PENDING_VALIDATION
                ) && s.tx_hash.is_some()
            })
            .cloned()
            .collect();
        // last_checked_at ASC NULLS FIRST
        steps.sort_by(|a, b| match (a.last_checked_at, b.last_checked_at) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(&b),
        });
        steps.truncate(limit as usize);
        Ok(steps)
    }
}

#[derive(Default)]
pub struct InMemoryWalletRepository {
    wallets: Mutex<HashMap<String, Wallet>>,
}

impl InMemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        let mut wallets = self.wallets.lock().unwrap();
        if wallets.values().any(|w| w.address == wallet.address) {
            return Err(WalletError::InvalidData(format!(
                "a wallet already exists for address {}",
                wallet.address
            )));
        }
        wallets.insert(wallet.id.clone(), wallet.clone());
        Ok(wallet)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Wallet>, WalletError> {
        Ok(self.wallets.lock().unwrap().get(id).cloned())
    }

    async fn update_seed(
        &self,
        id: &str,
        seed_ciphertext: Vec<u8>,
        seed_nonce: Vec<u8>,
        seed_tag: Vec<u8>,
    ) -> Result<(), WalletError> {
        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets
            .get_mut(id)
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        wallet.seed_ciphertext = seed_ciphertext;
        wallet.seed_nonce = seed_nonce;
        wallet.seed_tag = seed_tag;
        wallet.updated_at = Utc::now();
        Ok(())
    }
}

/// Cableado completo de casos de uso reales sobre los fakes.
pub struct TestHarness {
    pub operation_repo: Arc<InMemoryOperationRepository>,
    pub wallet_repo: Arc<InMemoryWalletRepository>,
    pub gateway: Arc<StubLedgerGateway>,
    pub cipher: Arc<SeedCipher>,
    pub secret_store: Arc<CachedSecretStore>,
    pub signer_locks: Arc<SignerLocks>,
    pub executor: Arc<ExecuteOperationUseCase>,
}

/// Ventana inline corta para que los escenarios de timeout corran en milisegundos.
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        poll_interval: Duration::from_millis(5),
        inline_timeout: Duration::from_millis(100),
    }
}

impl TestHarness {
    pub fn new(gateway: StubLedgerGateway) -> Self {
        Self::with_config(gateway, fast_config())
    }

    pub fn with_config(gateway: StubLedgerGateway, config: ExecutorConfig) -> Self {
        let operation_repo = Arc::new(InMemoryOperationRepository::new());
        let wallet_repo = Arc::new(InMemoryWalletRepository::new());
        let gateway = Arc::new(gateway);
        let cipher = Arc::new(SeedCipher::new(&[42u8; 32]));
        let secret_store = Arc::new(CachedSecretStore::new(
            wallet_repo.clone(),
            cipher.clone(),
            ISSUER_SEED.to_string(),
            Duration::from_secs(3600),
        ));
        let signer_locks = Arc::new(SignerLocks::new());

        let executor = Arc::new(ExecuteOperationUseCase::new(
            operation_repo.clone(),
            wallet_repo.clone(),
            secret_store.clone(),
            gateway.clone(),
            signer_locks.clone(),
            config,
        ));

        Self {
            operation_repo,
            wallet_repo,
            gateway,
            cipher,
            secret_store,
            signer_locks,
            executor,
        }
    }

    pub fn submit_intent(&self) -> SubmitIntentUseCase {
        SubmitIntentUseCase::new(
            self.operation_repo.clone(),
            self.wallet_repo.clone(),
            self.executor.clone(),
        )
    }

    pub fn create_wallet(&self) -> CreateWalletUseCase {
        CreateWalletUseCase::new(
            self.wallet_repo.clone(),
            self.gateway.clone(),
            self.cipher.clone(),
        )
    }

    pub fn fund_wallet(&self) -> FundWalletUseCase {
        FundWalletUseCase::new(self.wallet_repo.clone(), self.gateway.clone())
    }

    pub fn poller(&self) -> ValidationPollerJob {
        ValidationPollerJob::new(self.operation_repo.clone(), self.gateway.clone())
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            submit_intent_use_case: self.submit_intent(),
            get_operation_use_case: GetOperationUseCase::new(self.operation_repo.clone()),
            create_wallet_use_case: self.create_wallet(),
            get_wallet_use_case: GetWalletUseCase::new(
                self.wallet_repo.clone(),
                self.secret_store.clone(),
                self.gateway.clone(),
            ),
            fund_wallet_use_case: self.fund_wallet(),
        })
    }

    /// Espera (con timeout) a que la operación alcance el estado esperado.
    pub async fn wait_for_status(
        &self,
        id: OperationId,
        expected: OperationStatus,
        timeout: Duration,
    ) -> Operation {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let operation = self
                .operation_repo
                .find_by_id(id)
                .await
                .unwrap()
                .expect("operation must exist");
            if operation.status == expected {
                return operation;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "operation {} never reached {:?}; last seen {:?} ({:?})",
                    id, expected, operation.status, operation.error_message
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Espera a que un paso alcance el estado esperado.
    pub async fn wait_for_step_status(
        &self,
        operation_id: OperationId,
        step_no: i32,
        expected: StepStatus,
        timeout: Duration,
    ) -> OperationStep {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let steps = self.operation_repo.find_steps(operation_id).await.unwrap();
            if let Some(step) = steps
                .iter()
                .find(|s| s.step_no == step_no && s.status == expected)
            {
                return step.clone();
            }
            if tokio::time::Instant::now() >= deadline {
                let seen: Vec<(i32, StepStatus)> =
                    steps.iter().map(|s| (s.step_no, s.status)).collect();
                panic!(
                    "step {} of {} never reached {:?}; steps seen: {:?}",
                    step_no, operation_id, expected, seen
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn steps(&self, operation_id: OperationId) -> Vec<OperationStep> {
        self.operation_repo.find_steps(operation_id).await.unwrap()
    }

    pub async fn operation(&self, operation_id: OperationId) -> Operation {
        self.operation_repo
            .find_by_id(operation_id)
            .await
            .unwrap()
            .expect("operation must exist")
    }
}
