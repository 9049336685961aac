use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::domain::error::SecretError;

/// Longitud del nonce de AES-GCM.
const NONCE_SIZE: usize = 12;
/// Longitud del tag de autenticación de AES-GCM.
const TAG_SIZE: usize = 16;

/// Material cifrado de un seed: la tripleta que se persiste por registro.
#[derive(Debug, Clone)]
pub struct SealedSeed {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Cifrador de seeds en reposo.
///
/// AES-256-GCM bajo la master key de 32 bytes del proceso, con un nonce fresco
/// de 12 bytes por cifrado. El tag de autenticación se separa del ciphertext
/// para persistirse en su propia columna.
pub struct SeedCipher {
    cipher: Aes256Gcm,
}

impl SeedCipher {
    pub fn new(master_key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(master_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedSeed, SecretError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| SecretError::Integrity("encryption failed".to_string()))?;

        // aes-gcm retorna ciphertext || tag; separamos el tag para su columna
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(SealedSeed {
            ciphertext: sealed,
            nonce: nonce.to_vec(),
            tag,
        })
    }

    pub fn open(&self, sealed: &SealedSeed, identity_id: &str) -> Result<String, SecretError> {
        if sealed.nonce.len() != NONCE_SIZE || sealed.tag.len() != TAG_SIZE {
            return Err(SecretError::Integrity(identity_id.to_string()));
        }

        let mut combined = sealed.ciphertext.clone();
        combined.extend_from_slice(&sealed.tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), combined.as_slice())
            .map_err(|_| SecretError::Integrity(identity_id.to_string()))?;

        String::from_utf8(plaintext).map_err(|_| SecretError::Integrity(identity_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = SeedCipher::new(&test_key(1));
        let sealed = cipher.seal("sEdTM1uX8pu2do5XvTnutH6HsouMaM2").unwrap();

        assert_eq!(sealed.nonce.len(), 12);
        assert_eq!(sealed.tag.len(), 16);

        let opened = cipher.open(&sealed, "wallet-1").unwrap();
        assert_eq!(opened, "sEdTM1uX8pu2do5XvTnutH6HsouMaM2");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let cipher = SeedCipher::new(&test_key(1));
        let a = cipher.seal("same-seed").unwrap();
        let b = cipher.seal("same-seed").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SeedCipher::new(&test_key(1)).seal("top-seed").unwrap();
        let result = SeedCipher::new(&test_key(2)).open(&sealed, "wallet-1");
        assert!(matches!(result, Err(SecretError::Integrity(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = SeedCipher::new(&test_key(1));
        let mut sealed = cipher.seal("top-seed").unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        assert!(matches!(
            cipher.open(&sealed, "wallet-1"),
            Err(SecretError::Integrity(_))
        ));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let cipher = SeedCipher::new(&test_key(1));
        let mut sealed = cipher.seal("top-seed").unwrap();
        sealed.tag[0] ^= 0xFF;
        assert!(matches!(
            cipher.open(&sealed, "wallet-1"),
            Err(SecretError::Integrity(_))
        ));
    }
}
