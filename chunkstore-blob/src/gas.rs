//! Blob fee market pricing.
//!
//! All arithmetic is integer-only. Overflow is reported as an
//! `Estimation` error rather than wrapped or saturated, so a fee is never
//! silently under-quoted.

use alloy_primitives::U256;
use tracing::debug;

use crate::{ChainClient, FeeData, StoreError, StoreResult, TxFees};

/// Floor of the blob base fee, in wei per blob gas
pub const MIN_BASE_FEE_PER_BLOB_GAS: u64 = 1;

/// Denominator controlling how fast the blob base fee reacts
pub const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 3_338_477;

/// Blob gas consumed by one blob
pub const GAS_PER_BLOB: u64 = 1 << 17;

/// Integer approximation of `factor * e^(numerator / denominator)`
pub fn fake_exponential(factor: U256, numerator: U256, denominator: U256) -> StoreResult<U256> {
    if denominator.is_zero() {
        return Err(StoreError::estimation("Zero denominator"));
    }

    let overflow = || StoreError::estimation("Blob fee computation overflowed");

    let mut output = U256::ZERO;
    let mut accum = factor.checked_mul(denominator).ok_or_else(overflow)?;
    let mut i = U256::from(1u64);
    while !accum.is_zero() {
        output = output.checked_add(accum).ok_or_else(overflow)?;
        let divisor = denominator.checked_mul(i).ok_or_else(overflow)?;
        accum = accum.checked_mul(numerator).ok_or_else(overflow)? / divisor;
        i += U256::from(1u64);
    }
    Ok(output / denominator)
}

/// Blob base fee implied by `excess_blob_gas`
pub fn blob_base_fee(excess_blob_gas: u64) -> StoreResult<U256> {
    fake_exponential(
        U256::from(MIN_BASE_FEE_PER_BLOB_GAS),
        U256::from(excess_blob_gas),
        U256::from(BLOB_BASE_FEE_UPDATE_FRACTION),
    )
}

/// `value * percent / 100`, rounded up
pub fn apply_multiplier(value: U256, percent: u64) -> StoreResult<U256> {
    let scaled = value
        .checked_mul(U256::from(percent))
        .and_then(|v| v.checked_add(U256::from(99u64)))
        .ok_or_else(|| StoreError::estimation("Fee multiplier overflowed"))?;
    Ok(scaled / U256::from(100u64))
}

/// Turns chain fee quotes into transaction fees with a safety margin
#[derive(Debug, Clone, Copy)]
pub struct GasPriceEstimator {
    multiplier_percent: u64,
}

impl GasPriceEstimator {
    pub fn new(multiplier_percent: u64) -> Self {
        Self { multiplier_percent }
    }

    pub fn multiplier_percent(&self) -> u64 {
        self.multiplier_percent
    }

    /// Multiplied blob fee for the given congestion
    pub fn blob_fee(&self, excess_blob_gas: u64) -> StoreResult<U256> {
        apply_multiplier(blob_base_fee(excess_blob_gas)?, self.multiplier_percent)
    }

    /// Combine a fee quote and congestion into transaction fees.
    ///
    /// EIP-1559 fields are used when both are quoted, otherwise the legacy
    /// gas price stands in for both caps.
    pub fn tx_fees(&self, fee_data: &FeeData, excess_blob_gas: u64) -> StoreResult<TxFees> {
        let (max_fee, priority) = match (fee_data.max_fee_per_gas, fee_data.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => (max_fee, priority),
            _ => match fee_data.gas_price {
                Some(price) => (price, price),
                None => return Err(StoreError::estimation("Chain returned no usable fee data")),
            },
        };

        if max_fee.is_zero() {
            return Err(StoreError::estimation("Chain quoted a zero gas price"));
        }

        Ok(TxFees {
            max_fee_per_gas: apply_multiplier(max_fee, self.multiplier_percent)?,
            max_priority_fee_per_gas: apply_multiplier(priority, self.multiplier_percent)?,
            max_fee_per_blob_gas: self.blob_fee(excess_blob_gas)?,
        })
    }

    /// Fetch a fresh quote from the chain and price it
    pub async fn quote(&self, chain: &dyn ChainClient) -> StoreResult<TxFees> {
        let fee_data = chain
            .get_fee_data()
            .await
            .map_err(|e| StoreError::estimation(format!("Fee data unavailable: {}", e)))?;
        let excess = chain
            .get_excess_blob_gas()
            .await
            .map_err(|e| StoreError::estimation(format!("Excess blob gas unavailable: {}", e)))?;

        let fees = self.tx_fees(&fee_data, excess)?;
        debug!(
            max_fee_per_gas = %fees.max_fee_per_gas,
            max_fee_per_blob_gas = %fees.max_fee_per_blob_gas,
            excess_blob_gas = excess,
            "Quoted transaction fees"
        );
        Ok(fees)
    }
}

impl Default for GasPriceEstimator {
    fn default() -> Self {
        Self::new(120)
    }
}
