use async_trait::async_trait;
use common::identity::IdentityId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::error::{SecretError, WalletError};
use crate::domain::repository::WalletRepository;
use crate::domain::secrets::SecretStore;
use crate::infrastructure::crypto::{SealedSeed, SeedCipher};

struct CachedSeed {
    seed: String,
    inserted_at: Instant,
}

/// Credential store con caché TTL.
///
/// El seed del emisor vive solo en la configuración del proceso y se responde
/// sin consultar almacenamiento ni caché. Los seeds de usuario se descifran
/// desde la fila de wallet en el primer acceso y quedan cacheados en un mapa
/// protegido por mutex hasta que expire el TTL (default 1 h); un barrido
/// periódico (~1 min, disparado desde `main`) limpia entradas vencidas.
pub struct CachedSecretStore {
    wallet_repo: Arc<dyn WalletRepository>,
    cipher: Arc<SeedCipher>,
    issuer_seed: String,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedSeed>>,
}

impl CachedSecretStore {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        cipher: Arc<SeedCipher>,
        issuer_seed: String,
        ttl: Duration,
    ) -> Self {
        Self {
            wallet_repo,
            cipher,
            issuer_seed,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Elimina del caché las entradas cuyo TTL venció. Storage intacto.
    pub fn sweep(&self) {
        let mut cache = self.cache.lock().unwrap();
        let before = cache.len();
        cache.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!("Secret cache sweep evicted {} stale entries", evicted);
        }
    }

    fn cache_get(&self, identity_id: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(identity_id)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.seed.clone())
    }

    fn cache_put(&self, identity_id: &str, seed: String) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            identity_id.to_string(),
            CachedSeed {
                seed,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl SecretStore for CachedSecretStore {
    async fn fetch_seed(&self, identity_id: &IdentityId) -> Result<String, SecretError> {
        if identity_id.is_issuer() {
            if self.issuer_seed.is_empty() {
                return Err(SecretError::Configuration(
                    "issuer seed is not configured".to_string(),
                ));
            }
            return Ok(self.issuer_seed.clone());
        }

        if let Some(seed) = self.cache_get(identity_id.as_str()) {
            return Ok(seed);
        }

        let wallet = self
            .wallet_repo
            .find_by_id(identity_id.as_str())
            .await
            .map_err(|e| match e {
                WalletError::NotFound(id) => SecretError::NotFound(id),
                other => SecretError::RepositoryError(other.to_string()),
            })?
            .ok_or_else(|| SecretError::NotFound(identity_id.to_string()))?;

        let sealed = SealedSeed {
            ciphertext: wallet.seed_ciphertext,
            nonce: wallet.seed_nonce,
            tag: wallet.seed_tag,
        };
        let seed = self.cipher.open(&sealed, identity_id.as_str())?;

        self.cache_put(identity_id.as_str(), seed.clone());
        Ok(seed)
    }

    async fn store_seed(&self, identity_id: &IdentityId, seed: &str) -> Result<(), SecretError> {
        if identity_id.is_issuer() {
            return Err(SecretError::IssuerReserved);
        }

        let sealed = self.cipher.seal(seed)?;
        self.wallet_repo
            .update_seed(
                identity_id.as_str(),
                sealed.ciphertext,
                sealed.nonce,
                sealed.tag,
            )
            .await
            .map_err(|e| match e {
                WalletError::NotFound(id) => SecretError::NotFound(id),
                other => SecretError::RepositoryError(other.to_string()),
            })?;

        self.cache_put(identity_id.as_str(), seed.to_string());
        Ok(())
    }

    async fn clear(&self, identity_id: &IdentityId) {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(identity_id.as_str());
    }

    async fn clear_all(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.clear();
    }
}
