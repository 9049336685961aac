use common::identity::IdentityId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializador de identidades firmantes.
///
/// Exclusión mutua por identidad: como los números de secuencia por cuenta del
/// ledger son lineales, dos submits en vuelo del mismo firmante compiten y uno
/// falla con past-sequence. `acquire` garantiza a lo sumo un submit en vuelo
/// por firmante dentro del proceso; identidades distintas proceden en paralelo
/// y los que esperan por la misma identidad encolan FIFO.
///
/// Los locks son locales al proceso. La coordinación multi-instancia queda
/// fuera de alcance (ver la tabla `signer_locks` reservada en el esquema).
pub struct SignerLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SignerLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Toma el lock exclusivo de la identidad. El guard retornado lo libera al
    /// soltarse. Volver a llamar `acquire` para la misma identidad sin soltar
    /// el guard anterior suspende hasta que aquel se libere.
    pub async fn acquire(&self, identity_id: &IdentityId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(identity_id.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Observacional, para tests y métricas.
    pub fn is_locked(&self, identity_id: &IdentityId) -> bool {
        let locks = self.locks.lock().unwrap();
        locks
            .get(identity_id.as_str())
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Cantidad de identidades con lock tomado en este instante.
    pub fn locked_count(&self) -> usize {
        let locks = self.locks.lock().unwrap();
        locks.values().filter(|m| m.try_lock().is_err()).count()
    }
}

impl Default for SignerLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_identity_is_mutually_exclusive() {
        let locks = Arc::new(SignerLocks::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&IdentityId::issuer()).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_identities_run_in_parallel() {
        let locks = Arc::new(SignerLocks::new());

        let guard_a = locks.acquire(&IdentityId::new("wallet-a")).await;
        // wallet-b no debe bloquearse por el lock de wallet-a
        let guard_b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&IdentityId::new("wallet-b")),
        )
        .await
        .expect("distinct identity must not queue");

        assert_eq!(locks.locked_count(), 2);
        drop(guard_a);
        drop(guard_b);
        assert_eq!(locks.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_is_locked_observes_held_guard() {
        let locks = SignerLocks::new();
        let identity = IdentityId::new("wallet-a");

        assert!(!locks.is_locked(&identity));
        let guard = locks.acquire(&identity).await;
        assert!(locks.is_locked(&identity));
        drop(guard);
        assert!(!locks.is_locked(&identity));
    }
}
