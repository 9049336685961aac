use std::sync::Arc;
use tracing::info;

use crate::domain::entities::Wallet;
use crate::domain::error::WalletError;
use crate::domain::gateways::LedgerGateway;
use crate::domain::repository::WalletRepository;
use crate::infrastructure::crypto::SeedCipher;

/// Caso de uso que gestiona la creación segura de una billetera de usuario.
///
/// Si el caller no trae seed, el gateway genera el par (seed, address); si lo
/// trae, solo se deriva la dirección. El seed se sella con AES-256-GCM y la
/// fila de custodia se inserta ya cifrada: el plaintext nunca se persiste.
pub struct CreateWalletUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    ledger_gateway: Arc<dyn LedgerGateway>,
    cipher: Arc<SeedCipher>,
}

impl CreateWalletUseCase {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        ledger_gateway: Arc<dyn LedgerGateway>,
        cipher: Arc<SeedCipher>,
    ) -> Self {
        Self {
            wallet_repo,
            ledger_gateway,
            cipher,
        }
    }

    pub async fn execute(&self, seed: Option<String>) -> Result<Wallet, WalletError> {
        let (seed, address) = match seed {
            Some(seed) => {
                let seed = seed.trim().to_string();
                if seed.is_empty() {
                    return Err(WalletError::InvalidData(
                        "seed must not be blank".to_string(),
                    ));
                }
                let address = self
                    .ledger_gateway
                    .derive_address(&seed)
                    .await
                    .map_err(|e| WalletError::GatewayError(e.to_string()))?;
                (seed, address)
            }
            None => self
                .ledger_gateway
                .generate_wallet()
                .await
                .map_err(|e| WalletError::GatewayError(e.to_string()))?,
        };

        let sealed = self
            .cipher
            .seal(&seed)
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        let wallet = Wallet::new(address, sealed.ciphertext, sealed.nonce, sealed.tag);
        let saved = self.wallet_repo.create(wallet).await?;

        info!("Wallet {} created for address {}", saved.id, saved.address);
        Ok(saved)
    }
}
