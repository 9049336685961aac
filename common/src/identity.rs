use serde::{Deserialize, Serialize};
use std::fmt;

/// Identificador de Identidad Firmante usando NewType Pattern.
///
/// Una identidad puede ser una billetera de usuario custodiada (su id opaco en BD)
/// o el literal reservado `"issuer"`, que refiere a la identidad emisora configurada
/// en el proceso y que nunca existe como fila en la tabla de wallets.
///
/// # Examples
/// ```
/// use common::identity::IdentityId;
///
/// let user = IdentityId::new("3f2c61f0-8b2a-4c57-9c1e-0a77b4a1d001");
/// assert!(!user.is_issuer());
/// assert!(IdentityId::issuer().is_issuer());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    /// Literal reservado para la identidad emisora.
    pub const ISSUER: &'static str = "issuer";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// La identidad emisora virtual (no persistida).
    pub fn issuer() -> Self {
        Self(Self::ISSUER.to_string())
    }

    pub fn is_issuer(&self) -> bool {
        self.0 == Self::ISSUER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
