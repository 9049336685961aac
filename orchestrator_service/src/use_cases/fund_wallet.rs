use common::identity::IdentityId;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::domain::error::WalletError;
use crate::domain::gateways::LedgerGateway;
use crate::domain::repository::WalletRepository;

/// Caso de uso de fondeo por faucet (solo redes de prueba).
///
/// El emisor se fondea por fuera del orquestador; pedir faucet para `"issuer"`
/// es un error del caller.
pub struct FundWalletUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    ledger_gateway: Arc<dyn LedgerGateway>,
}

impl FundWalletUseCase {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        ledger_gateway: Arc<dyn LedgerGateway>,
    ) -> Self {
        Self {
            wallet_repo,
            ledger_gateway,
        }
    }

    /// Pide fondeo al faucet y retorna la dirección con su balance observado
    /// (None si la cuenta todavía no apareció en un ledger validado).
    pub async fn execute(&self, id: &str) -> Result<(String, Option<Decimal>), WalletError> {
        if id == IdentityId::ISSUER {
            return Err(WalletError::IssuerFunding);
        }

        let wallet = self
            .wallet_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;

        self.ledger_gateway
            .fund(&wallet.address)
            .await
            .map_err(|e| WalletError::GatewayError(e.to_string()))?;

        let balance = self
            .ledger_gateway
            .balance(&wallet.address)
            .await
            .map_err(|e| WalletError::GatewayError(e.to_string()))?;

        info!("Wallet {} funded at {}", wallet.id, wallet.address);
        Ok((wallet.address, balance))
    }
}
