//! Configuration for safe-sentinel.
//!
//! Settings are loaded with priority: env var > settings.json > default.
//! `.env` files (`./.env`, then `~/.safe-sentinel/.env`) are loaded via
//! dotenvy early in startup.

pub(crate) mod helpers;

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::settings::Settings;

pub const DEFAULT_SAFE_TRANSACTION_API_URL: &str =
    "https://safe-transaction-sepolia.safe.global/api/v1";
pub const DEFAULT_ANALYZER_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_SIGNER_API_URL: &str = "http://localhost:8001";
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api-sepolia.etherscan.io/api";
pub const DEFAULT_SAFE_APP_URL: &str = "https://app.safe.global";
pub const DEFAULT_NETWORK_PREFIX: &str = "sep";
pub const DEFAULT_SAFE_ADDRESS: &str = "0x179a8BDDa1AB5fEF17AAF6Ff0FFCb2875925668F";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 600;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub registry: RegistryConfig,
    pub analyzer: AnalyzerConfig,
    pub signer: SignerConfig,
    pub etherscan: EtherscanConfig,
    /// Safe address shown when none is given explicitly.
    pub default_safe: String,
    /// Timeout for every non-streaming request.
    pub http_timeout: Duration,
}

/// Safe Transaction Service.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
}

impl RegistryConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: helpers::resolve_url(
                "SAFE_TRANSACTION_API_URL",
                settings.safe_transaction_api_url.as_ref(),
                DEFAULT_SAFE_TRANSACTION_API_URL,
            )?,
        })
    }
}

/// Analyzer backend (risk detection, intent matching, simulation).
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub base_url: String,
    /// `None` disables the idle timeout.
    pub stream_idle_timeout: Option<Duration>,
}

impl AnalyzerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = helpers::resolve_url(
            "BACKEND_API_URL_ANALYZER",
            settings.analyzer_api_url.as_ref(),
            DEFAULT_ANALYZER_API_URL,
        )?;

        let idle_secs = helpers::parse_optional_env::<u64>("ANALYZER_STREAM_IDLE_TIMEOUT_SECS")?
            .or(settings.stream_idle_timeout_secs)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);

        Ok(Self {
            base_url,
            stream_idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        })
    }
}

/// Signing backend and the Safe web app it hands off to.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    pub base_url: String,
    pub safe_app_url: String,
    pub network_prefix: String,
}

impl SignerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = helpers::resolve_url(
            "BACKEND_API_URL_SAFE",
            settings.signer_api_url.as_ref(),
            DEFAULT_SIGNER_API_URL,
        )?;
        let safe_app_url = helpers::resolve_url(
            "SAFE_APP_URL",
            settings.safe_app_url.as_ref(),
            DEFAULT_SAFE_APP_URL,
        )?;

        let network_prefix = helpers::optional_env("SAFE_NETWORK_PREFIX")?
            .or_else(|| settings.network_prefix.clone())
            .unwrap_or_else(|| DEFAULT_NETWORK_PREFIX.to_string());
        if !network_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::InvalidValue {
                key: "SAFE_NETWORK_PREFIX".to_string(),
                message: format!("expected a chain short name like 'eth' or 'sep', got '{network_prefix}'"),
            });
        }

        Ok(Self {
            base_url,
            safe_app_url,
            network_prefix,
        })
    }
}

/// Etherscan-compatible contract source lookup.
#[derive(Debug, Clone)]
pub struct EtherscanConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
}

impl EtherscanConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: helpers::resolve_url(
                "ETHERSCAN_API_URL",
                settings.etherscan_api_url.as_ref(),
                DEFAULT_ETHERSCAN_API_URL,
            )?,
            api_key: helpers::optional_env("ETHERSCAN_API_KEY")?.map(SecretString::from),
        })
    }
}

impl Config {
    /// Load configuration from env files, the process env and settings.json.
    pub fn from_env() -> Result<Self, ConfigError> {
        crate::bootstrap::load_env();
        Self::build(&Settings::load())
    }

    /// Build config from already-loaded settings.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let http_timeout_secs = helpers::parse_optional_env::<u64>("HTTP_TIMEOUT_SECS")?
            .or(settings.http_timeout_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HTTP_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let default_safe = helpers::optional_env("SAFE_SENTINEL_DEFAULT_SAFE")?
            .or_else(|| settings.default_safe.clone())
            .unwrap_or_else(|| DEFAULT_SAFE_ADDRESS.to_string());

        Ok(Self {
            registry: RegistryConfig::resolve(settings)?,
            analyzer: AnalyzerConfig::resolve(settings)?,
            signer: SignerConfig::resolve(settings)?,
            etherscan: EtherscanConfig::resolve(settings)?,
            default_safe,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}
