use async_trait::async_trait;
use common::identity::IdentityId;

use crate::domain::error::SecretError;

// Port for custody of signing material
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Seed en claro de una identidad. Para `"issuer"` retorna el seed
    /// configurado del proceso sin tocar almacenamiento ni caché.
    async fn fetch_seed(&self, identity_id: &IdentityId) -> Result<String, SecretError>;

    /// Cifra y persiste el seed de una identidad de usuario. Rechaza el
    /// literal reservado `"issuer"`.
    async fn store_seed(&self, identity_id: &IdentityId, seed: &str) -> Result<(), SecretError>;

    /// Evicción de caché. No toca el almacenamiento.
    async fn clear(&self, identity_id: &IdentityId);

    async fn clear_all(&self);
}
