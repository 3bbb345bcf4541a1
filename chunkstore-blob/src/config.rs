use std::time::Duration;

use serde::Deserialize;

use crate::codec::{SLOTS_PER_UNIT, SLOT_SIZE};
use crate::{StoreError, StoreResult};

/// Prefix for environment overrides, e.g. `CHUNKSTORE__MAX_BLOBS_PER_TX=3`
pub const ENV_PREFIX: &str = "CHUNKSTORE__";

/// Configuration for chunk-store operations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Field slots per blob unit
    pub slots_per_unit: usize,

    /// Width of one field slot in bytes (one guard byte + payload)
    pub slot_size: usize,

    /// Protocol bound on blobs carried by a single transaction
    pub max_blobs_per_tx: usize,

    /// Upper bound on chunks per content item (safety guard)
    pub max_chunks: u64,

    /// Content items uploaded at the same time by `upload_all`
    pub concurrency: usize,

    /// Safety multiplier applied to quoted fees, in percent (120 = 1.2x)
    pub gas_multiplier_percent: u64,

    /// Delay between receipt polls while waiting for inclusion
    pub receipt_poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            slots_per_unit: SLOTS_PER_UNIT,
            slot_size: SLOT_SIZE,
            max_blobs_per_tx: 6,
            max_chunks: 10_000,
            concurrency: 15,
            gas_multiplier_percent: 120,
            receipt_poll_interval_ms: 3_000,
        }
    }
}

impl StoreConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// `CHUNKSTORE__MAX_BLOBS_PER_TX=3` sets `max_blobs_per_tx`.
    pub fn with_env_overrides(self) -> StoreResult<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `(NAME, value)` overrides using the `CHUNKSTORE__` convention
    pub fn with_overrides<I>(mut self, vars: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let field = stripped.to_lowercase();
            match field.as_str() {
                "slots_per_unit" => self.slots_per_unit = parse_var(&key, &value)?,
                "slot_size" => self.slot_size = parse_var(&key, &value)?,
                "max_blobs_per_tx" => self.max_blobs_per_tx = parse_var(&key, &value)?,
                "max_chunks" => self.max_chunks = parse_var(&key, &value)?,
                "concurrency" => self.concurrency = parse_var(&key, &value)?,
                "gas_multiplier_percent" => self.gas_multiplier_percent = parse_var(&key, &value)?,
                "receipt_poll_interval_ms" => {
                    self.receipt_poll_interval_ms = parse_var(&key, &value)?
                }
                _ => {
                    return Err(StoreError::config(format!("Unknown setting: {}", key)));
                }
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.slot_size < 2 {
            return Err(StoreError::config("slot_size must be at least 2"));
        }
        if self.slots_per_unit == 0 {
            return Err(StoreError::config("slots_per_unit must be at least 1"));
        }
        if self.max_blobs_per_tx == 0 {
            return Err(StoreError::config("max_blobs_per_tx must be at least 1"));
        }
        if self.max_chunks == 0 {
            return Err(StoreError::config("max_chunks must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(StoreError::config("concurrency must be at least 1"));
        }
        if self.gas_multiplier_percent < 100 {
            return Err(StoreError::config(format!(
                "gas_multiplier_percent must be >= 100, got {}",
                self.gas_multiplier_percent
            )));
        }
        Ok(())
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Set blob geometry (mostly useful with small units in tests)
    pub fn with_geometry(mut self, slots_per_unit: usize, slot_size: usize) -> Self {
        self.slots_per_unit = slots_per_unit;
        self.slot_size = slot_size;
        self
    }

    pub fn with_max_blobs_per_tx(mut self, max: usize) -> Self {
        self.max_blobs_per_tx = max;
        self
    }

    pub fn with_max_chunks(mut self, max: u64) -> Self {
        self.max_chunks = max;
        self
    }

    /// Set default worker count for multi-item uploads
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn with_gas_multiplier_percent(mut self, percent: u64) -> Self {
        self.gas_multiplier_percent = percent;
        self
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval_ms = interval.as_millis() as u64;
        self
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> StoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::config(format!("Invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slots_per_unit * config.slot_size, 131_072);
        assert_eq!(config.concurrency, 15);
        assert_eq!(config.receipt_poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_json_keeps_missing_defaults() {
        let config = StoreConfig::from_json(r#"{ "max_blobs_per_tx": 3 }"#).unwrap();
        assert_eq!(config.max_blobs_per_tx, 3);
        assert_eq!(config.slot_size, 32);
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        let result = StoreConfig::from_json(r#"{ "slot_size": 1 }"#);
        assert!(matches!(result, Err(StoreError::Config { .. })));

        let result = StoreConfig::from_json("not json");
        assert!(matches!(result, Err(StoreError::Serialization { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("CHUNKSTORE__MAX_BLOBS_PER_TX".to_string(), "2".to_string()),
            ("CHUNKSTORE__CONCURRENCY".to_string(), " 4 ".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let config = StoreConfig::new().with_overrides(vars).unwrap();
        assert_eq!(config.max_blobs_per_tx, 2);
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_overrides_reject_garbage() {
        let vars = vec![("CHUNKSTORE__MAX_CHUNKS".to_string(), "many".to_string())];
        assert!(StoreConfig::new().with_overrides(vars).is_err());

        let vars = vec![("CHUNKSTORE__NOPE".to_string(), "1".to_string())];
        assert!(StoreConfig::new().with_overrides(vars).is_err());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let config = StoreConfig::new().with_gas_multiplier_percent(90);
        assert!(config.validate().is_err());
    }
}
