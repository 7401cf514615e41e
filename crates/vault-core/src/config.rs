use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::VaultError;

pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_STORAGE_PREFIX: &str = "solana";
pub const DEFAULT_CONFIRM_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CONFIRM_MAX_ATTEMPTS: u32 = 60;

/// Commitment level used for reads and for deciding when a submission counts
/// as confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl FromStr for Commitment {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(VaultError::Config(format!(
                "unknown commitment level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    pub rpc_url: String,
    pub commitment: Commitment,
    /// Prefix of every persisted key, e.g. `solana-tokens-<identity>`.
    pub storage_prefix: String,
    /// Directory for the file store. `None` keeps everything in memory.
    pub storage_dir: Option<PathBuf>,
    pub confirm_poll_interval: Duration,
    pub confirm_max_attempts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEVNET_RPC_URL.to_string(),
            commitment: Commitment::default(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            storage_dir: None,
            confirm_poll_interval: Duration::from_millis(DEFAULT_CONFIRM_POLL_INTERVAL_MS),
            confirm_max_attempts: DEFAULT_CONFIRM_MAX_ATTEMPTS,
        }
    }
}

impl VaultConfig {
    pub fn builder() -> VaultConfigBuilder {
        VaultConfigBuilder::new()
    }

    /// Load configuration from the process environment, reading a `.env`
    /// file first when one exists.
    pub fn from_env() -> Result<Self, VaultError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("ignoring unreadable .env file: {e}"),
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup. Unset or
    /// blank variables fall back to their defaults.
    pub fn from_vars<F>(lookup: F) -> Result<Self, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = VaultConfigBuilder::new();

        if let Some(url) = get("RPC_URL") {
            builder = builder.with_rpc(url);
        }
        if let Some(level) = get("RPC_COMMITMENT") {
            builder = builder.with_commitment(level.parse()?);
        }
        if let Some(prefix) = get("VAULT_STORAGE_PREFIX") {
            builder = builder.with_storage_prefix(prefix);
        }
        if let Some(dir) = get("VAULT_STORAGE_DIR") {
            builder = builder.with_storage_dir(dir);
        }
        if let Some(ms) = get("CONFIRM_POLL_INTERVAL_MS") {
            builder = builder.with_confirm_poll_interval_ms(parse_number("CONFIRM_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(n) = get("CONFIRM_MAX_ATTEMPTS") {
            builder = builder.with_confirm_max_attempts(parse_number("CONFIRM_MAX_ATTEMPTS", &n)?);
        }

        builder.build()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, VaultError> {
    value
        .trim()
        .parse()
        .map_err(|_| VaultError::Config(format!("{key} must be a number, got '{value}'")))
}

#[derive(Debug, Clone, Default)]
pub struct VaultConfigBuilder {
    config: VaultConfig,
}

impl VaultConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rpc(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.config.commitment = commitment;
        self
    }

    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage_prefix = prefix.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = Some(dir.into());
        self
    }

    pub fn with_confirm_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.confirm_poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_confirm_max_attempts(mut self, attempts: u32) -> Self {
        self.config.confirm_max_attempts = attempts;
        self
    }

    pub fn build(self) -> Result<VaultConfig, VaultError> {
        let config = self.config;

        if !(config.rpc_url.starts_with("http://") || config.rpc_url.starts_with("https://")) {
            return Err(VaultError::Config(format!(
                "RPC URL must be http(s), got '{}'",
                config.rpc_url
            )));
        }
        if config.storage_prefix.is_empty()
            || !config
                .storage_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VaultError::Config(format!(
                "storage prefix '{}' must be non-empty and use only [A-Za-z0-9_-]",
                config.storage_prefix
            )));
        }
        if config.confirm_max_attempts == 0 {
            return Err(VaultError::Config(
                "confirmation needs at least one attempt".into(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_devnet() {
        let config = VaultConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.rpc_url, DEVNET_RPC_URL);
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.storage_prefix, "solana");
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = VaultConfig::from_vars(vars(&[
            ("RPC_URL", "http://127.0.0.1:8899"),
            ("RPC_COMMITMENT", "Finalized"),
            ("VAULT_STORAGE_PREFIX", "local"),
            ("VAULT_STORAGE_DIR", "/tmp/vault"),
            ("CONFIRM_POLL_INTERVAL_MS", "10"),
            ("CONFIRM_MAX_ATTEMPTS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.rpc_url, "http://127.0.0.1:8899");
        assert_eq!(config.commitment, Commitment::Finalized);
        assert_eq!(config.storage_prefix, "local");
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/vault")));
        assert_eq!(config.confirm_poll_interval, Duration::from_millis(10));
        assert_eq!(config.confirm_max_attempts, 3);
    }

    #[test]
    fn blank_variables_are_ignored() {
        let config = VaultConfig::from_vars(vars(&[("RPC_URL", "  ")])).unwrap();
        assert_eq!(config.rpc_url, DEVNET_RPC_URL);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(VaultConfig::from_vars(vars(&[("RPC_COMMITMENT", "max")])).is_err());
        assert!(VaultConfig::from_vars(vars(&[("CONFIRM_MAX_ATTEMPTS", "lots")])).is_err());
        assert!(VaultConfig::from_vars(vars(&[("CONFIRM_MAX_ATTEMPTS", "0")])).is_err());
        assert!(VaultConfig::from_vars(vars(&[("RPC_URL", "ftp://example.com")])).is_err());
        assert!(VaultConfig::from_vars(vars(&[("VAULT_STORAGE_PREFIX", "a/b")])).is_err());
    }

    #[test]
    fn commitment_orders_by_strength() {
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
        assert_eq!("confirmed".parse::<Commitment>().unwrap().as_str(), "confirmed");
    }
}
