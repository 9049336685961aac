use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::info;

use crate::domain::error::LedgerError;
use crate::domain::gateways::{
    LedgerGateway, LedgerTx, LookupStatus, PreparedTx, SignedTx, SubmitAck,
};

/// Margen de ledgers que una transacción preparada sigue siendo presentable.
const LAST_LEDGER_OFFSET: u64 = 20;

/// Adaptador JSON-RPC al ledger de liquidación (rippled y compatibles).
///
/// `sign` delega en el método RPC `sign` del nodo, disponible en nodos locales
/// o standalone de redes de prueba; contra mainnet el adaptador debe
/// reemplazarse por uno con firma local.
pub struct XrplJsonRpcGateway {
    http: reqwest::Client,
    rpc_url: String,
    faucet_url: Option<String>,
}

impl XrplJsonRpcGateway {
    pub fn new(rpc_url: String, faucet_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
            faucet_url,
        }
    }

    /// Llamada JSON-RPC cruda. Los errores de transporte son transitorios
    /// (`Connection`); la ausencia del sobre `result` es de protocolo.
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({ "method": method, "params": [params] });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Protocol(format!("{}: missing result envelope", method)))
    }

    /// Rechaza respuestas con error embebido (`{"result":{"error": …}}`).
    fn expect_success(method: &str, result: Value) -> Result<Value, LedgerError> {
        if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
            let detail = result
                .get("error_message")
                .and_then(|m| m.as_str())
                .unwrap_or(error);
            return Err(LedgerError::Protocol(format!("{}: {}", method, detail)));
        }
        Ok(result)
    }
}

#[async_trait]
impl LedgerGateway for XrplJsonRpcGateway {
    /// Autocompleta los campos comunes que el llamador no proveyó: Fee,
    /// Sequence y LastLedgerSequence.
    async fn prepare(&self, tx: LedgerTx) -> Result<PreparedTx, LedgerError> {
        let mut tx_json = tx.fields.clone();
        let fields = tx_json
            .as_object_mut()
            .ok_or_else(|| LedgerError::Protocol("tx fields must be a JSON object".to_string()))?;

        fields.insert("TransactionType".to_string(), json!(tx.tx_type));

        if !fields.contains_key("Fee") {
            let fee = self.call("fee", json!({})).await?;
            let drops = fee
                .pointer("/drops/open_ledger_fee")
                .and_then(|d| d.as_str())
                .unwrap_or("10")
                .to_string();
            fields.insert("Fee".to_string(), json!(drops));
        }

        if !fields.contains_key("Sequence") {
            let account = fields
                .get("Account")
                .and_then(|a| a.as_str())
                .ok_or_else(|| LedgerError::Protocol("tx is missing Account".to_string()))?
                .to_string();
            let info = Self::expect_success(
                "account_info",
                self.call(
                    "account_info",
                    json!({ "account": account, "ledger_index": "current" }),
                )
                .await?,
            )?;
            let sequence = info
                .pointer("/account_data/Sequence")
                .and_then(|s| s.as_u64())
                .ok_or_else(|| {
                    LedgerError::Protocol("account_info: missing Sequence".to_string())
                })?;
            fields.insert("Sequence".to_string(), json!(sequence));
        }

        if !fields.contains_key("LastLedgerSequence") {
            let current = self.call("ledger_current", json!({})).await?;
            let index = current
                .get("ledger_current_index")
                .and_then(|i| i.as_u64())
                .ok_or_else(|| {
                    LedgerError::Protocol("ledger_current: missing index".to_string())
                })?;
            fields.insert(
                "LastLedgerSequence".to_string(),
                json!(index + LAST_LEDGER_OFFSET),
            );
        }

        Ok(PreparedTx { tx_json })
    }

    async fn sign(&self, tx: &PreparedTx, seed: &str) -> Result<SignedTx, LedgerError> {
        let result = Self::expect_success(
            "sign",
            self.call("sign", json!({ "tx_json": tx.tx_json, "secret": seed }))
                .await?,
        )?;

        let tx_blob = result
            .get("tx_blob")
            .and_then(|b| b.as_str())
            .ok_or_else(|| LedgerError::Protocol("sign: missing tx_blob".to_string()))?
            .to_string();
        let hash = result
            .pointer("/tx_json/hash")
            .and_then(|h| h.as_str())
            .ok_or_else(|| LedgerError::Protocol("sign: missing canonical hash".to_string()))?
            .to_string();

        Ok(SignedTx { tx_blob, hash })
    }

    async fn submit(&self, tx_blob: &str) -> Result<SubmitAck, LedgerError> {
        let result = Self::expect_success(
            "submit",
            self.call("submit", json!({ "tx_blob": tx_blob })).await?,
        )?;

        let engine_result = result
            .get("engine_result")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown")
            .to_string();
        let tx_hash = result
            .pointer("/tx_json/hash")
            .and_then(|h| h.as_str())
            .ok_or_else(|| LedgerError::Protocol("submit: missing tx hash".to_string()))?
            .to_string();
        let validated_ledger_index = result
            .get("validated_ledger_index")
            .and_then(|i| i.as_u64());

        Ok(SubmitAck {
            tx_hash,
            engine_result,
            raw: result,
            validated_ledger_index,
        })
    }

    async fn lookup(&self, tx_hash: &str) -> Result<LookupStatus, LedgerError> {
        let result = self
            .call("tx", json!({ "transaction": tx_hash, "binary": false }))
            .await?;

        // txnNotFound es la señal normal de "todavía no está en un ledger"
        if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
            if error == "txnNotFound" {
                return Ok(LookupStatus::NotFound);
            }
            return Err(LedgerError::Protocol(format!("tx: {}", error)));
        }

        let validated = result
            .get("validated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let metadata = result.get("meta").cloned().unwrap_or(Value::Null);
        let transaction_result = metadata
            .get("TransactionResult")
            .and_then(|r| r.as_str())
            .map(|r| r.to_string());

        Ok(LookupStatus::Found {
            validated,
            transaction_result,
            metadata,
        })
    }

    async fn fund(&self, address: &str) -> Result<(), LedgerError> {
        let faucet_url = self.faucet_url.as_ref().ok_or_else(|| {
            LedgerError::Protocol("faucet funding is not available on this network".to_string())
        })?;

        let response = self
            .http
            .post(faucet_url)
            .json(&json!({ "destination": address }))
            .send()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Protocol(format!(
                "faucet rejected funding request: HTTP {}",
                response.status()
            )));
        }

        info!("Faucet funding requested for {}", address);
        Ok(())
    }

    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError> {
        let result = self
            .call(
                "account_info",
                json!({ "account": address, "ledger_index": "validated" }),
            )
            .await?;

        if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
            if error == "actNotFound" {
                return Ok(None);
            }
            return Err(LedgerError::Protocol(format!("account_info: {}", error)));
        }

        let drops = result
            .pointer("/account_data/Balance")
            .and_then(|b| b.as_str())
            .ok_or_else(|| LedgerError::Protocol("account_info: missing Balance".to_string()))?;

        let balance = Decimal::from_str(drops)
            .map_err(|e| LedgerError::Protocol(format!("account_info: bad Balance: {}", e)))?;

        Ok(Some(balance))
    }

    async fn generate_wallet(&self) -> Result<(String, String), LedgerError> {
        let result =
            Self::expect_success("wallet_propose", self.call("wallet_propose", json!({})).await?)?;

        let seed = result
            .get("master_seed")
            .and_then(|s| s.as_str())
            .ok_or_else(|| LedgerError::Protocol("wallet_propose: missing seed".to_string()))?
            .to_string();
        let address = result
            .get("account_id")
            .and_then(|a| a.as_str())
            .ok_or_else(|| LedgerError::Protocol("wallet_propose: missing address".to_string()))?
            .to_string();

        Ok((seed, address))
    }

    async fn derive_address(&self, seed: &str) -> Result<String, LedgerError> {
        let result = Self::expect_success(
            "wallet_propose",
            self.call("wallet_propose", json!({ "seed": seed })).await?,
        )?;

        result
            .get("account_id")
            .and_then(|a| a.as_str())
            .map(|a| a.to_string())
            .ok_or_else(|| LedgerError::Protocol("wallet_propose: missing address".to_string()))
    }
}
