use std::time::Duration;

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ChainClient;

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: U256,
    pub blob_gas_used: u64,
    pub blob_gas_price: U256,
}

impl TxReceipt {
    /// Execution fee plus blob fee actually charged
    pub fn fee(&self) -> U256 {
        let execution = U256::from(self.gas_used).saturating_mul(self.effective_gas_price);
        let blob = U256::from(self.blob_gas_used).saturating_mul(self.blob_gas_price);
        execution.saturating_add(blob)
    }
}

/// Poll for a receipt every `interval` until the transaction is mined.
///
/// There is no upper bound on the number of polls. Failed polls are
/// logged and retried like pending ones.
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    tx_hash: B256,
    interval: Duration,
) -> TxReceipt {
    let mut polls: u64 = 0;
    loop {
        polls += 1;
        match chain.get_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                debug!(%tx_hash, polls, success = receipt.success, "Transaction mined");
                return receipt;
            }
            Ok(None) => {
                debug!(%tx_hash, polls, "Transaction pending");
            }
            Err(e) => {
                warn!(%tx_hash, polls, "Receipt poll failed: {}", e);
            }
        }
        tokio::time::sleep(interval).await;
    }
}
