use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::domain::error::LedgerError;
use crate::domain::gateways::{
    LedgerGateway, LedgerTx, LookupStatus, PreparedTx, SignedTx, SubmitAck,
};

/// Implementación determinista del gateway de ledger para desarrollo y testing.
///
/// No habla con ninguna red: firma serializando el tx_json, asigna hashes
/// secuenciales y valida según un guion configurable:
///
/// * `with_result_for(tx_type, code)` fija el TransactionResult con el que
///   validará cada transacción de ese tipo (default `tesSUCCESS`).
/// * `with_not_found_rounds(n)` hace que cada transacción responda "not found"
///   a los primeros `n` lookups, para ejercitar el timeout inline y el poller.
/// * `with_submit_delay(d)` mantiene cada submit "en vuelo" durante `d`,
///   mientras contabiliza la concurrencia por cuenta firmante, de modo que los
///   tests puedan afirmar la exclusión por firmante.
pub struct StubLedgerGateway {
    state: Mutex<StubState>,
    submit_delay: Duration,
}

struct StubState {
    next_id: u64,
    not_found_rounds: u32,
    not_found_rounds_by_tx_type: HashMap<String, u32>,
    results_by_tx_type: HashMap<String, String>,
    txs: HashMap<String, StubTx>,
    submit_order: Vec<(String, String)>,
    in_flight: HashMap<String, u32>,
    max_in_flight: HashMap<String, u32>,
    funded: HashSet<String>,
}

struct StubTx {
    tx_type: String,
    result: String,
    issuance_id: String,
    lookups_served: u32,
}

impl StubLedgerGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                next_id: 0,
                not_found_rounds: 0,
                not_found_rounds_by_tx_type: HashMap::new(),
                results_by_tx_type: HashMap::new(),
                txs: HashMap::new(),
                submit_order: Vec::new(),
                in_flight: HashMap::new(),
                max_in_flight: HashMap::new(),
                funded: HashSet::new(),
            }),
            submit_delay: Duration::ZERO,
        }
    }

    pub fn with_not_found_rounds(self, rounds: u32) -> Self {
        self.state.lock().unwrap().not_found_rounds = rounds;
        self
    }

    /// Rondas de "not found" solo para un tipo de transacción; los demás tipos
    /// siguen el valor global.
    pub fn with_not_found_rounds_for(self, tx_type: &str, rounds: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .not_found_rounds_by_tx_type
            .insert(tx_type.to_string(), rounds);
        self
    }

    /// Reconfigura en caliente las rondas de "not found" de un tipo, para que
    /// un test haga expirar la ventana inline y luego deje validar al poller.
    pub fn set_not_found_rounds_for(&self, tx_type: &str, rounds: u32) {
        self.state
            .lock()
            .unwrap()
            .not_found_rounds_by_tx_type
            .insert(tx_type.to_string(), rounds);
    }

    pub fn with_result_for(self, tx_type: &str, result: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .results_by_tx_type
            .insert(tx_type.to_string(), result.to_string());
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Orden observado de submits: (cuenta firmante, tipo de transacción).
    pub fn submit_order(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submit_order.clone()
    }

    /// Máximo de submits simultáneos observados para una cuenta.
    pub fn max_in_flight_for(&self, address: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .max_in_flight
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Máximo de submits simultáneos observados sobre todas las cuentas.
    pub fn max_concurrent_submissions(&self) -> u32 {
        self.state
            .lock()
            .unwrap()
            .max_in_flight
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.next_id
    }
}

impl Default for StubLedgerGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerGateway for StubLedgerGateway {
    async fn prepare(&self, tx: LedgerTx) -> Result<PreparedTx, LedgerError> {
        let mut tx_json = tx.fields.clone();
        let fields = tx_json
            .as_object_mut()
            .ok_or_else(|| LedgerError::Protocol("tx fields must be a JSON object".to_string()))?;

        fields.insert("TransactionType".to_string(), json!(tx.tx_type));
        fields.entry("Fee".to_string()).or_insert(json!("10"));
        fields
            .entry("Sequence".to_string())
            .or_insert(json!(self.next_id()));
        fields
            .entry("LastLedgerSequence".to_string())
            .or_insert(json!(1_000_000));

        Ok(PreparedTx { tx_json })
    }

    async fn sign(&self, tx: &PreparedTx, _seed: &str) -> Result<SignedTx, LedgerError> {
        let hash = format!("{:064X}", self.next_id());

        let mut tx_json = tx.tx_json.clone();
        tx_json
            .as_object_mut()
            .ok_or_else(|| LedgerError::Protocol("tx_json must be a JSON object".to_string()))?
            .insert("hash".to_string(), json!(hash));

        Ok(SignedTx {
            tx_blob: tx_json.to_string(),
            hash,
        })
    }

    async fn submit(&self, tx_blob: &str) -> Result<SubmitAck, LedgerError> {
        let tx_json: Value = serde_json::from_str(tx_blob)
            .map_err(|e| LedgerError::Protocol(format!("unparseable tx_blob: {}", e)))?;

        let account = tx_json
            .get("Account")
            .and_then(|a| a.as_str())
            .unwrap_or("unknown")
            .to_string();
        let tx_type = tx_json
            .get("TransactionType")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        let hash = tx_json
            .get("hash")
            .and_then(|h| h.as_str())
            .ok_or_else(|| LedgerError::Protocol("tx_blob was not signed".to_string()))?
            .to_string();

        // Entrada: registramos orden y concurrencia por cuenta
        {
            let mut state = self.state.lock().unwrap();
            state
                .submit_order
                .push((account.clone(), tx_type.clone()));
            let current = state.in_flight.entry(account.clone()).or_insert(0);
            *current += 1;
            let current = *current;
            let max = state.max_in_flight.entry(account.clone()).or_insert(0);
            *max = (*max).max(current);
        }

        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        // Salida: la transacción queda registrada y visible para lookup
        {
            let mut state = self.state.lock().unwrap();
            if let Some(count) = state.in_flight.get_mut(&account) {
                *count -= 1;
            }
            let result = state
                .results_by_tx_type
                .get(&tx_type)
                .cloned()
                .unwrap_or_else(|| "tesSUCCESS".to_string());
            let issuance_id = format!("{:048X}", state.next_id);
            state.txs.insert(
                hash.clone(),
                StubTx {
                    tx_type: tx_type.clone(),
                    result,
                    issuance_id,
                    lookups_served: 0,
                },
            );
        }

        info!("[StubLedgerGateway] submit {} from {}", tx_type, account);

        Ok(SubmitAck {
            tx_hash: hash.clone(),
            engine_result: "tesSUCCESS".to_string(),
            raw: json!({ "engine_result": "tesSUCCESS", "tx_json": { "hash": hash } }),
            validated_ledger_index: None,
        })
    }

    async fn lookup(&self, tx_hash: &str) -> Result<LookupStatus, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let default_rounds = state.not_found_rounds;

        let tx_type = match state.txs.get(tx_hash) {
            Some(tx) => tx.tx_type.clone(),
            None => return Ok(LookupStatus::NotFound),
        };
        let not_found_rounds = state
            .not_found_rounds_by_tx_type
            .get(&tx_type)
            .copied()
            .unwrap_or(default_rounds);

        let Some(tx) = state.txs.get_mut(tx_hash) else {
            return Ok(LookupStatus::NotFound);
        };

        tx.lookups_served += 1;
        if tx.lookups_served <= not_found_rounds {
            return Ok(LookupStatus::NotFound);
        }

        let mut metadata = json!({ "TransactionResult": tx.result });
        if tx.tx_type == "MPTokenIssuanceCreate" && tx.result == "tesSUCCESS" {
            metadata
                .as_object_mut()
                .unwrap()
                .insert("mpt_issuance_id".to_string(), json!(tx.issuance_id));
        }

        Ok(LookupStatus::Found {
            validated: true,
            transaction_result: Some(tx.result.clone()),
            metadata,
        })
    }

    async fn fund(&self, address: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.funded.insert(address.to_string());
        Ok(())
    }

    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.funded.contains(address) {
            Ok(Some(Decimal::from(10_000_000)))
        } else {
            Ok(None)
        }
    }

    async fn generate_wallet(&self) -> Result<(String, String), LedgerError> {
        let id = self.next_id();
        Ok((
            format!("sEdStubSeed{:020}", id),
            format!("rStubAddress{:020}", id),
        ))
    }

    async fn derive_address(&self, seed: &str) -> Result<String, LedgerError> {
        // Los pares generados por el propio stub derivan a su dirección
        // original; cualquier otro seed deriva de forma determinista.
        if let Some(suffix) = seed.strip_prefix("sEdStubSeed") {
            return Ok(format!("rStubAddress{}", suffix));
        }
        let encoded = hex::encode(seed.as_bytes());
        let short = &encoded[..encoded.len().min(30)];
        Ok(format!("rStub{}", short))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_rounds_then_validated() {
        let gateway = StubLedgerGateway::new().with_not_found_rounds(2);

        let prepared = gateway
            .prepare(LedgerTx {
                tx_type: "Payment".to_string(),
                fields: json!({ "Account": "rA" }),
            })
            .await
            .unwrap();
        let signed = gateway.sign(&prepared, "sSeed").await.unwrap();
        let ack = gateway.submit(&signed.tx_blob).await.unwrap();
        assert_eq!(ack.tx_hash, signed.hash);

        for _ in 0..2 {
            assert!(matches!(
                gateway.lookup(&ack.tx_hash).await.unwrap(),
                LookupStatus::NotFound
            ));
        }
        match gateway.lookup(&ack.tx_hash).await.unwrap() {
            LookupStatus::Found {
                validated,
                transaction_result,
                ..
            } => {
                assert!(validated);
                assert_eq!(transaction_result.as_deref(), Some("tesSUCCESS"));
            }
            other => panic!("expected validated lookup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_issuance_create_carries_issuance_id_in_meta() {
        let gateway = StubLedgerGateway::new();

        let prepared = gateway
            .prepare(LedgerTx {
                tx_type: "MPTokenIssuanceCreate".to_string(),
                fields: json!({ "Account": "rIssuer" }),
            })
            .await
            .unwrap();
        let signed = gateway.sign(&prepared, "sIssuer").await.unwrap();
        let ack = gateway.submit(&signed.tx_blob).await.unwrap();

        match gateway.lookup(&ack.tx_hash).await.unwrap() {
            LookupStatus::Found { metadata, .. } => {
                assert!(metadata.get("mpt_issuance_id").is_some());
            }
            other => panic!("expected validated lookup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scripted_result_applies_per_tx_type() {
        let gateway = StubLedgerGateway::new().with_result_for("MPTokenAuthorize", "tecNO_AUTH");

        let prepared = gateway
            .prepare(LedgerTx {
                tx_type: "MPTokenAuthorize".to_string(),
                fields: json!({ "Account": "rUser" }),
            })
            .await
            .unwrap();
        let signed = gateway.sign(&prepared, "sUser").await.unwrap();
        let ack = gateway.submit(&signed.tx_blob).await.unwrap();

        match gateway.lookup(&ack.tx_hash).await.unwrap() {
            LookupStatus::Found {
                transaction_result, ..
            } => assert_eq!(transaction_result.as_deref(), Some("tecNO_AUTH")),
            other => panic!("expected validated lookup, got {:?}", other),
        }
    }
}
