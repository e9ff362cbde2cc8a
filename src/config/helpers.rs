//! Env lookup and validation shared by the config resolvers.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values alike.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!("failed to read {key}: {e}"))),
    }
}

/// Parse an optional env var into `T`, naming the key on failure.
pub(crate) fn parse_optional_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a non-negative integer: {e}"),
        })
}

/// Check that `value` is an absolute http(s) URL and strip any trailing `/`.
pub(crate) fn validate_base_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a valid URL '{value}': {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http(s) URL, got scheme '{}'", parsed.scheme()),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Env var, then settings value, then default; validated as a base URL.
pub(crate) fn resolve_url(
    key: &str,
    from_settings: Option<&String>,
    default: &str,
) -> Result<String, ConfigError> {
    let raw = optional_env(key)?
        .or_else(|| from_settings.cloned())
        .unwrap_or_else(|| default.to_string());
    validate_base_url(key, &raw)
}
