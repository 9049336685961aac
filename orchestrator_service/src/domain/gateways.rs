use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::error::LedgerError;

/// Transacción de ledger construida por el step executor, antes del autofill.
/// `fields` lleva los campos específicos del tipo (Account, Destination,
/// Amount, etc.); el adaptador completa los campos comunes en `prepare`.
#[derive(Debug, Clone)]
pub struct LedgerTx {
    pub tx_type: String,
    pub fields: Value,
}

/// Transacción con los campos comunes autocompletados (fee, sequence,
/// last-ledger-sequence), lista para firmar.
#[derive(Debug, Clone)]
pub struct PreparedTx {
    pub tx_json: Value,
}

#[derive(Debug, Clone)]
pub struct SignedTx {
    pub tx_blob: String,
    /// Hash canónico de la transacción firmada.
    pub hash: String,
}

/// Acuse tentativo de submit. `engine_result` es preliminar; el resultado
/// definitivo llega recién con la validación.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    pub tx_hash: String,
    pub engine_result: String,
    pub raw: Value,
    pub validated_ledger_index: Option<u64>,
}

/// Resultado de `lookup`. `NotFound` es la señal normal de "todavía no está en
/// un ledger", no un error.
#[derive(Debug, Clone)]
pub enum LookupStatus {
    NotFound,
    Found {
        validated: bool,
        transaction_result: Option<String>,
        metadata: Value,
    },
}

// Port for the external settlement ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn prepare(&self, tx: LedgerTx) -> Result<PreparedTx, LedgerError>;

    async fn sign(&self, tx: &PreparedTx, seed: &str) -> Result<SignedTx, LedgerError>;

    async fn submit(&self, tx_blob: &str) -> Result<SubmitAck, LedgerError>;

    async fn lookup(&self, tx_hash: &str) -> Result<LookupStatus, LedgerError>;

    /// Fondea una dirección desde el faucet de la red de prueba.
    async fn fund(&self, address: &str) -> Result<(), LedgerError>;

    /// Balance nativo de la cuenta, o `None` si la cuenta no existe aún.
    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError>;

    /// Genera un par (seed, address) nuevo.
    async fn generate_wallet(&self) -> Result<(String, String), LedgerError>;

    /// Deriva la dirección correspondiente a un seed existente.
    async fn derive_address(&self, seed: &str) -> Result<String, LedgerError>;
}
