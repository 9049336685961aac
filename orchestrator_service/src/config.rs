use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errores de configuración. Fatales en el arranque: el proceso no debe servir
/// tráfico sin master key o sin seed del emisor.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// Red de liquidación contra la que opera el proceso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNetwork {
    Testnet,
    Devnet,
    Mainnet,
}

impl LedgerNetwork {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            "mainnet" => Ok(Self::Mainnet),
            other => Err(ConfigError::Invalid(
                "LEDGER_NETWORK".to_string(),
                format!("unknown network {}", other),
            )),
        }
    }

    pub fn json_rpc_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://s.altnet.rippletest.net:51234/",
            Self::Devnet => "https://s.devnet.rippletest.net:51234/",
            Self::Mainnet => "https://s1.ripple.com:51234/",
        }
    }

    pub fn faucet_url(&self) -> Option<&'static str> {
        match self {
            Self::Testnet => Some("https://faucet.altnet.rippletest.net/accounts"),
            Self::Devnet => Some("https://faucet.devnet.rippletest.net/accounts"),
            Self::Mainnet => None,
        }
    }
}

/// Configuración tipada del proceso, cargada una vez en el arranque.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Master key de AES-256-GCM para los seeds en reposo.
    pub master_key: [u8; 32],
    /// Seed del emisor. Nunca se persiste.
    pub issuer_seed: String,
    pub network: LedgerNetwork,
    pub secret_cache_ttl: Duration,
    pub log_level: tracing::Level,
    pub host: String,
    pub port: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;

        let master_key_hex = require("ENCRYPTION_MASTER_KEY")?;
        let master_key_bytes = hex::decode(master_key_hex.trim()).map_err(|e| {
            ConfigError::Invalid("ENCRYPTION_MASTER_KEY".to_string(), e.to_string())
        })?;
        let master_key: [u8; 32] = master_key_bytes.try_into().map_err(|_| {
            ConfigError::Invalid(
                "ENCRYPTION_MASTER_KEY".to_string(),
                "expected 64 hex characters (32 bytes)".to_string(),
            )
        })?;

        let issuer_seed = require("ISSUER_SEED")?;

        let network = match env::var("LEDGER_NETWORK") {
            Ok(value) => LedgerNetwork::parse(&value)?,
            Err(_) => LedgerNetwork::Testnet,
        };

        let secret_cache_ttl = match env::var("SECRET_CACHE_TTL_MS") {
            Ok(value) => {
                let ms: u64 = value.trim().parse().map_err(|_| {
                    ConfigError::Invalid("SECRET_CACHE_TTL_MS".to_string(), value.clone())
                })?;
                Duration::from_millis(ms)
            }
            Err(_) => Duration::from_millis(3_600_000),
        };

        let log_level = match env::var("LOG_LEVEL") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid("LOG_LEVEL".to_string(), value.clone()))?,
            Err(_) => tracing::Level::INFO,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        Ok(Self {
            database_url,
            master_key,
            issuer_seed,
            network,
            secret_cache_ttl,
            log_level,
            host,
            port,
        })
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name.to_string())),
    }
}
