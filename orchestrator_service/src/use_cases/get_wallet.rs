use chrono::{DateTime, Utc};
use common::identity::IdentityId;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::error::WalletError;
use crate::domain::gateways::LedgerGateway;
use crate::domain::repository::WalletRepository;
use crate::domain::secrets::SecretStore;

/// Vista pública de una billetera: nunca expone material de seed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub id: String,
    pub address: String,
    /// La billetera del emisor es virtual: no existe como fila; su dirección
    /// se deriva a demanda del seed configurado.
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Caso de uso de consulta de billetera, incluida la virtual del emisor.
pub struct GetWalletUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    secret_store: Arc<dyn SecretStore>,
    ledger_gateway: Arc<dyn LedgerGateway>,
}

impl GetWalletUseCase {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        secret_store: Arc<dyn SecretStore>,
        ledger_gateway: Arc<dyn LedgerGateway>,
    ) -> Self {
        Self {
            wallet_repo,
            secret_store,
            ledger_gateway,
        }
    }

    pub async fn execute(&self, id: &str) -> Result<WalletView, WalletError> {
        if id == IdentityId::ISSUER {
            let seed = self
                .secret_store
                .fetch_seed(&IdentityId::issuer())
                .await
                .map_err(|e| WalletError::RepositoryError(e.to_string()))?;
            let address = self
                .ledger_gateway
                .derive_address(&seed)
                .await
                .map_err(|e| WalletError::GatewayError(e.to_string()))?;

            return Ok(WalletView {
                id: IdentityId::ISSUER.to_string(),
                address,
                is_virtual: true,
                created_at: None,
            });
        }

        let wallet = self
            .wallet_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;

        Ok(WalletView {
            id: wallet.id,
            address: wallet.address,
            is_virtual: false,
            created_at: Some(wallet.created_at),
        })
    }
}
