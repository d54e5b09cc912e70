//! Configuration for the name index build.

use crate::error::{GeodexError, Result};
use serde::{Deserialize, Serialize};

/// Default number of records per store flush.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default size of the streaming read buffer (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default settings key of the persisted "already built" flag.
pub const DEFAULT_FLAG_NAME: &str = "name_index_built";

/// Largest possible record in a name index source file:
/// 8-byte id, 1-byte length, up to 255 name bytes.
pub const MAX_NAME_RECORD_SIZE: usize = 8 + 1 + u8::MAX as usize;

/// Configuration for [`NameIndex`](crate::names::NameIndex) builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameIndexConfig {
    /// Number of decoded records accumulated before a store flush.
    pub batch_size: usize,
    /// Size of the fixed read buffer used while streaming the source file.
    pub buffer_size: usize,
    /// Settings key of the persisted build flag.
    pub flag_name: String,
}

impl Default for NameIndexConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flag_name: DEFAULT_FLAG_NAME.to_string(),
        }
    }
}

impl NameIndexConfig {
    /// Creates a configuration with custom settings.
    pub fn new(batch_size: usize, buffer_size: usize, flag_name: impl Into<String>) -> Self {
        Self {
            batch_size,
            buffer_size,
            flag_name: flag_name.into(),
        }
    }

    /// Checks that the configuration can drive a build.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Build` if the batch size is zero, the buffer
    /// cannot hold the largest record, or the flag name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GeodexError::Build("batch_size must be positive".into()));
        }
        if self.buffer_size < MAX_NAME_RECORD_SIZE {
            return Err(GeodexError::Build(format!(
                "buffer_size {} is smaller than the largest record ({} bytes)",
                self.buffer_size, MAX_NAME_RECORD_SIZE
            )));
        }
        if self.flag_name.trim().is_empty() {
            return Err(GeodexError::Build("flag_name must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NameIndexConfig::default();
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.flag_name, "name_index_built");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_buffer() {
        let config = NameIndexConfig::new(10, MAX_NAME_RECORD_SIZE - 1, "flag");
        assert!(matches!(config.validate(), Err(GeodexError::Build(_))));

        let config = NameIndexConfig::new(0, DEFAULT_BUFFER_SIZE, "flag");
        assert!(config.validate().is_err());

        let config = NameIndexConfig::new(1, MAX_NAME_RECORD_SIZE, "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NameIndexConfig = serde_json::from_str(r#"{"batch_size": 5}"#).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.flag_name, DEFAULT_FLAG_NAME);
    }
}
