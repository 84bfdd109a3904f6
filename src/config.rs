//! Runtime configuration
//!
//! Everything here must match between two peers except
//! `undecryptable_placeholder` and `publish_on_load`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::CipherSuite;
use crate::error::{CourierError, CourierResult};

/// BLAKE3 context for turning X25519 output into an envelope key
pub const DEFAULT_KDF_CONTEXT: &str = "courier 2024-06 direct message envelope key v1";

/// Text shown in place of a message that failed authentication
pub const DEFAULT_UNDECRYPTABLE_PLACEHOLDER: &str = "[Message could not be decrypted]";

/// Encryption layer settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// AEAD used for envelopes
    pub cipher_suite: CipherSuite,
    /// Key derivation context string
    pub kdf_context: String,
    /// Sentinel returned by `decrypt` on authentication failure
    pub undecryptable_placeholder: String,
    /// Re-publish an identity loaded from the store
    pub publish_on_load: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        CourierConfig {
            cipher_suite: CipherSuite::default(),
            kdf_context: DEFAULT_KDF_CONTEXT.to_string(),
            undecryptable_placeholder: DEFAULT_UNDECRYPTABLE_PLACEHOLDER.to_string(),
            publish_on_load: false,
        }
    }
}

impl CourierConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> CourierResult<Self> {
        let config: CourierConfig =
            toml::from_str(s).map_err(|e| CourierError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file
    pub fn load(path: &Path) -> CourierResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CourierError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> CourierResult<()> {
        if self.kdf_context.is_empty() {
            return Err(CourierError::Config("kdf_context must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = CourierConfig::from_toml_str("").unwrap();
        assert_eq!(config, CourierConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = CourierConfig::from_toml_str(
            r#"
            cipher_suite = "chacha20-poly1305"
            undecryptable_placeholder = "(unreadable)"
            "#,
        )
        .unwrap();

        assert_eq!(config.cipher_suite, CipherSuite::ChaCha20Poly1305);
        assert_eq!(config.undecryptable_placeholder, "(unreadable)");
        assert_eq!(config.kdf_context, DEFAULT_KDF_CONTEXT);
        assert!(!config.publish_on_load);
    }

    #[test]
    fn test_unknown_suite_rejected() {
        let err = CourierConfig::from_toml_str(r#"cipher_suite = "rot13""#).unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[test]
    fn test_empty_context_rejected() {
        let err = CourierConfig::from_toml_str(r#"kdf_context = """#).unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "publish_on_load = true\n").unwrap();

        let config = CourierConfig::load(&path).unwrap();
        assert!(config.publish_on_load);

        assert!(CourierConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
