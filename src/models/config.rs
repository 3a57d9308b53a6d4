//! Scanner configuration
//!
//! Every value comes from the environment with a documented default. Bad
//! numeric values never abort startup; they fall back with a warning.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    get_public_rpc_fallback, get_rpc_env_var, is_chain_supported, CHAIN_ID_ETHEREUM,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_FEE_CAP_PCT, DEFAULT_MAX_SOURCE_BYTES,
    DEFAULT_RPC_TIMEOUT_SECS, DEFAULT_TELEMETRY_DIR, ENV_API_KEYS, ENV_CACHE_TTL_SECS,
    ENV_ETHERSCAN_API_KEY, ENV_EXPLORER_URL, ENV_FEE_CAP_PCT, ENV_MAX_SOURCE_BYTES, ENV_MODEL,
    ENV_RPC_URL, ENV_TELEMETRY_DIR,
};

/// Resolved RPC endpoints for one chain
#[derive(Debug, Clone)]
pub struct RpcEndpoints {
    pub primary: String,
    pub fallback: Option<String>,
}

/// Configuration for the scanner, CLI and API
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Etherscan V2 key (never logged)
    pub etherscan_api_key: Option<String>,
    /// Explicit RPC override for every chain
    pub rpc_url: Option<String>,
    /// Etherscan-compatible endpoint replacing the V2 default
    pub explorer_url: Option<String>,
    /// Model JSON to load instead of the built-in priors
    pub model_path: Option<PathBuf>,
    /// Fee percentage treated as excessive
    pub fee_cap_pct: f64,
    /// Report cache TTL
    pub cache_ttl: Duration,
    /// Largest accepted input in bytes
    pub max_source_bytes: usize,
    pub telemetry_dir: PathBuf,
    /// Accepted `X-API-Key` values (empty = any)
    pub api_keys: Vec<String>,
    pub rpc_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let etherscan_api_key = non_empty_env(ENV_ETHERSCAN_API_KEY);
        if etherscan_api_key.is_some() {
            info!("🔑 {} configured (key hidden for security)", ENV_ETHERSCAN_API_KEY);
        }

        Self {
            etherscan_api_key,
            rpc_url: non_empty_env(ENV_RPC_URL),
            explorer_url: non_empty_env(ENV_EXPLORER_URL),
            model_path: non_empty_env(ENV_MODEL).map(PathBuf::from),
            fee_cap_pct: parse_env(ENV_FEE_CAP_PCT, DEFAULT_FEE_CAP_PCT),
            cache_ttl: Duration::from_secs(parse_env(ENV_CACHE_TTL_SECS, DEFAULT_CACHE_TTL_SECS)),
            max_source_bytes: parse_env(ENV_MAX_SOURCE_BYTES, DEFAULT_MAX_SOURCE_BYTES),
            telemetry_dir: non_empty_env(ENV_TELEMETRY_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TELEMETRY_DIR)),
            api_keys: non_empty_env(ENV_API_KEYS)
                .map(|raw| parse_key_list(&raw))
                .unwrap_or_default(),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
        }
    }
}

impl ScannerConfig {
    /// Config with built-in defaults only, ignoring the environment
    pub fn builtin() -> Self {
        Self {
            etherscan_api_key: None,
            rpc_url: None,
            explorer_url: None,
            model_path: None,
            fee_cap_pct: DEFAULT_FEE_CAP_PCT,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            telemetry_dir: PathBuf::from(DEFAULT_TELEMETRY_DIR),
            api_keys: Vec::new(),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
        }
    }

    /// RPC endpoints for a chain: override, per-chain env var, then public node
    pub fn rpc_endpoints(&self, chain_id: u64) -> AppResult<RpcEndpoints> {
        if !is_chain_supported(chain_id) {
            return Err(AppError::unsupported_chain(chain_id));
        }

        let fallback = get_public_rpc_fallback(chain_id).map(String::from);
        let primary = self
            .rpc_url
            .clone()
            .or_else(|| get_rpc_env_var(chain_id).and_then(non_empty_env))
            .or_else(|| fallback.clone())
            .ok_or_else(|| AppError::unsupported_chain(chain_id))?;

        // No point retrying the same public node twice
        let fallback = fallback.filter(|f| *f != primary);
        Ok(RpcEndpoints { primary, fallback })
    }

    pub fn default_chain() -> u64 {
        CHAIN_ID_ETHEREUM
    }

    pub fn is_api_key_accepted(&self, key: &str) -> bool {
        self.api_keys.is_empty() || self.api_keys.iter().any(|k| k == key)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match non_empty_env(name) {
        Some(raw) => parse_or_default(name, &raw, default),
        None => default,
    }
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("⚠️ Invalid {}='{}', using default {}", name, raw, default);
            default
        }
    }
}

/// Split a comma-separated key list, dropping blanks
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or_default("X", "30", 25.0), 30.0);
        assert_eq!(parse_or_default("X", "abc", 25.0), 25.0);
        assert_eq!(parse_or_default::<u64>("X", "-5", 600), 600);
    }

    #[test]
    fn test_parse_key_list() {
        assert_eq!(parse_key_list(" a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_key_list(" , ").is_empty());
    }

    #[test]
    fn test_rpc_endpoints_override() {
        let mut config = ScannerConfig::builtin();
        config.rpc_url = Some("http://localhost:8545".to_string());
        let endpoints = config.rpc_endpoints(1).unwrap();
        assert_eq!(endpoints.primary, "http://localhost:8545");
        assert_eq!(endpoints.fallback.as_deref(), Some("https://eth.llamarpc.com"));
    }

    #[test]
    fn test_rpc_endpoints_unsupported() {
        let config = ScannerConfig::builtin();
        let err = config.rpc_endpoints(999).unwrap_err();
        assert_eq!(err.code_str(), "CFG_UNSUPPORTED_CHAIN");
    }

    #[test]
    fn test_api_key_acceptance() {
        let mut config = ScannerConfig::builtin();
        assert!(config.is_api_key_accepted("anything"));
        config.api_keys = vec!["k1".to_string()];
        assert!(config.is_api_key_accepted("k1"));
        assert!(!config.is_api_key_accepted("k2"));
    }
}
