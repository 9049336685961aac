use crate::domain::entities::Wallet;
use crate::domain::error::WalletError;
use crate::domain::repository::WalletRepository;
use crate::infrastructure::persistence::models::WalletModel;
use async_trait::async_trait;
use sqlx::PgPool;

/// Repositorio de Billeteras basado en PostgreSQL.
pub struct PostgresWalletRepository {
    pool: PgPool,
}

impl PostgresWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletRepository for PostgresWalletRepository {
    /// Crea un registro de custodia. El esquema rechaza el id reservado
    /// "issuer" y direcciones duplicadas.
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        let model = WalletModel::from(&wallet);

        let saved_model = sqlx::query_as::<_, WalletModel>(
            r#"
            INSERT INTO wallets (
                id, address, seed_ciphertext, seed_nonce, seed_tag, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(model.id)
        .bind(model.address)
        .bind(model.seed_ciphertext)
        .bind(model.seed_nonce)
        .bind(model.seed_tag)
        .bind(model.created_at)
        .bind(model.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("wallets_address_key") {
                WalletError::InvalidData(format!(
                    "a wallet already exists for address {}",
                    wallet.address
                ))
            } else {
                WalletError::RepositoryError(e.to_string())
            }
        })?;

        Ok(saved_model.into())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Wallet>, WalletError> {
        let model_opt = sqlx::query_as::<_, WalletModel>(r#"SELECT * FROM wallets WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }

    async fn update_seed(
        &self,
        id: &str,
        seed_ciphertext: Vec<u8>,
        seed_nonce: Vec<u8>,
        seed_tag: Vec<u8>,
    ) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET seed_ciphertext = $1, seed_nonce = $2, seed_tag = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(seed_ciphertext)
        .bind(seed_nonce)
        .bind(seed_tag)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(id.to_string()));
        }

        Ok(())
    }
}
