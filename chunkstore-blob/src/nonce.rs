use std::future::Future;

use alloy_primitives::Address;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{ChainClient, StoreError, StoreResult};

/// Issues transaction sequence numbers for one signing identity.
///
/// The counter is seeded once from the chain and only moves forward. A
/// nonce handed out is never given back, even when its transaction fails.
#[derive(Debug)]
pub struct NonceCoordinator {
    identity: Address,
    next: Mutex<u64>,
}

impl NonceCoordinator {
    pub fn new(identity: Address, start: u64) -> Self {
        Self {
            identity,
            next: Mutex::new(start),
        }
    }

    /// Seed the counter from the chain's view of `identity`
    pub async fn seed(chain: &dyn ChainClient, identity: Address) -> StoreResult<Self> {
        let start = chain
            .get_nonce(identity)
            .await
            .map_err(|e| StoreError::remote_state(format!("Failed to fetch nonce: {}", e)))?;
        info!(%identity, start, "Seeded nonce coordinator");
        Ok(Self::new(identity, start))
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Take the next nonce
    pub async fn allocate(&self) -> u64 {
        let mut next = self.next.lock().await;
        let nonce = *next;
        *next += 1;
        nonce
    }

    /// Take the next nonce and run `submit` with it while still holding the
    /// counter, so transactions reach the client in nonce order.
    pub async fn submit_with_nonce<F, Fut, T>(&self, submit: F) -> T
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut next = self.next.lock().await;
        let nonce = *next;
        *next += 1;
        debug!(nonce, "Allocated nonce for submission");
        submit(nonce).await
    }

    /// Nonce the next allocation would return
    pub async fn peek(&self) -> u64 {
        *self.next.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sequential_allocation() {
        let nonces = NonceCoordinator::new(Address::ZERO, 7);
        assert_eq!(nonces.allocate().await, 7);
        assert_eq!(nonces.allocate().await, 8);
        assert_eq!(nonces.peek().await, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_is_contiguous() {
        let nonces = Arc::new(NonceCoordinator::new(Address::ZERO, 100));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let nonces = nonces.clone();
            handles.push(tokio::spawn(async move { nonces.allocate().await }));
        }

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort_unstable();

        assert_eq!(issued, (100..164).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_failed_submission_does_not_reclaim() {
        let nonces = NonceCoordinator::new(Address::ZERO, 0);

        let result: Result<(), String> = nonces
            .submit_with_nonce(|nonce| async move { Err(format!("send {} failed", nonce)) })
            .await;
        assert_eq!(result, Err("send 0 failed".to_string()));

        let used = nonces.submit_with_nonce(|nonce| async move { nonce }).await;
        assert_eq!(used, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submissions_are_serialized() {
        let nonces = Arc::new(NonceCoordinator::new(Address::ZERO, 0));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let nonces = nonces.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                nonces
                    .submit_with_nonce(|nonce| async move {
                        tokio::task::yield_now().await;
                        order.lock().push(nonce);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Submissions run one at a time, in the order nonces were issued
        assert_eq!(*order.lock(), (0..16).collect::<Vec<u64>>());
    }
}
