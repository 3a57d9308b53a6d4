//! RPC Client Module - `eth_getCode` over JSON-RPC
//!
//! 1. Endpoint from `TAXSCAN_RPC_URL`, the per-chain env var, or a public node
//! 2. Exponential backoff with ±20% jitter (500ms → 1s → 2s, capped at 8s)
//! 3. Primary endpoint first, then the public fallback
//! 4. User-Agent header, gzip, request timeout

use alloy_primitives::Address;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::{RpcEndpoints, ScannerConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{get_chain_name, USER_AGENT as USER_AGENT_CONST};

/// First retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 500;

/// Retry delay cap in milliseconds
pub const MAX_RETRY_MS: u64 = 8000;

/// Attempts per endpoint, including the first
pub const MAX_ATTEMPTS: u32 = 4;

pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Delay before `attempt` (1-based retry count), jittered by ±20%
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_RETRY_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let capped = base.min(MAX_RETRY_MS);
    let jitter_range = (capped * RETRY_JITTER_PERCENT / 100) as i64;
    let jitter: i64 = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    Duration::from_millis((capped as i64 + jitter).max(100) as u64)
}

/// Parse and checksum-normalise an address
pub fn parse_address(address: &str) -> AppResult<Address> {
    Address::from_str(address.trim())
        .map_err(|e| AppError::invalid_address(format!("'{}': {}", address, e)))
}

#[derive(Clone)]
pub struct RpcProvider {
    primary_url: String,
    fallback_url: Option<String>,
    client: reqwest::Client,
    chain_id: u64,
    network_name: &'static str,
}

impl RpcProvider {
    pub fn new(config: &ScannerConfig, chain_id: u64) -> AppResult<Self> {
        let RpcEndpoints { primary, fallback } = config.rpc_endpoints(chain_id)?;
        Ok(Self {
            primary_url: primary,
            fallback_url: fallback,
            client: Self::build_client(config.rpc_timeout)?,
            chain_id,
            network_name: get_chain_name(chain_id),
        })
    }

    pub(crate) fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))
    }

    /// JSON-RPC call on the primary endpoint, then the fallback
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let primary_err = match self.call_with_retry(&self.primary_url, &payload).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!("⚠️ Primary RPC failed on {}: {}", self.network_name, e);
                e
            }
        };

        if let Some(fallback) = &self.fallback_url {
            info!("🔄 Trying fallback RPC for {}", self.network_name);
            match self.call_with_retry(fallback, &payload).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("⚠️ Fallback RPC also failed: {}", e);
                    return Err(e);
                }
            }
        }
        Err(primary_err)
    }

    async fn call_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> AppResult<T> {
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!("⏳ Retry {}/{} after {}ms", attempt + 1, MAX_ATTEMPTS, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match self.execute_call::<T>(url, payload).await {
                Ok(result) => return Ok(result),
                Err(e) if !e.code.is_retryable() => return Err(e),
                Err(e) => {
                    if e.code == ErrorCode::RpcRateLimited {
                        warn!("⏳ Rate limited, backing off (attempt {}/{})", attempt + 1, MAX_ATTEMPTS);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::rpc("RPC call failed")))
    }

    async fn execute_call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> AppResult<T> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rpc_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::rpc(format!("HTTP error: {}", status)));
        }

        let json: RpcResponse<T> = response.json().await?;
        if let Some(error) = json.error {
            return Err(if error.is_rate_limit() {
                AppError::rpc_rate_limited()
            } else {
                AppError::rpc(format!("RPC error: {} (code: {})", error.message, error.code))
            });
        }
        json.result.ok_or_else(|| AppError::rpc("No result in response"))
    }

    /// Deployed runtime code as `0x` hex. Empty code is `TARGET_NOT_CONTRACT`.
    pub async fn get_code(&self, address: &str) -> AppResult<String> {
        let parsed = parse_address(address)?;
        let code: String = self
            .call("eth_getCode", serde_json::json!([parsed.to_string(), "latest"]))
            .await?;
        if code.trim_start_matches("0x").is_empty() {
            return Err(AppError::not_contract(address));
        }
        debug!("📦 {} bytes of code at {}", code.trim_start_matches("0x").len() / 2, parsed);
        Ok(code)
    }

    /// Primary URL with any path-embedded key hidden
    pub fn masked_url(&self) -> String {
        mask_url(&self.primary_url)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

fn mask_url(url: &str) -> String {
    match url.split_once("/v2/") {
        Some((head, _)) => format!("{}/v2/***HIDDEN***", head),
        None => url.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// HTTP 429 surfaced as JSON-RPC code -32005 or a message
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounds() {
        for attempt in 1..=MAX_ATTEMPTS {
            let base = (BASE_RETRY_MS << (attempt - 1)).min(MAX_RETRY_MS);
            let delay = backoff_delay(attempt).as_millis() as u64;
            assert!(delay >= base * 80 / 100, "attempt {} delay {}", attempt, delay);
            assert!(delay <= base * 120 / 100, "attempt {} delay {}", attempt, delay);
        }
        let late = backoff_delay(30).as_millis() as u64;
        assert!(late <= MAX_RETRY_MS * 120 / 100);
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0xdAC17F958D2ee523a2206206994597C13D831ec7").is_ok());
        assert!(parse_address(" 0xdac17f958d2ee523a2206206994597c13d831ec7 ").is_ok());
        let err = parse_address("0x1234").unwrap_err();
        assert_eq!(err.code_str(), "INPUT_INVALID_ADDRESS");
    }

    #[test]
    fn test_provider_endpoints() {
        let config = ScannerConfig {
            rpc_url: Some("https://eth-mainnet.g.alchemy.com/v2/secret".to_string()),
            ..ScannerConfig::builtin()
        };
        let provider = RpcProvider::new(&config, 1).unwrap();
        assert_eq!(provider.chain_id(), 1);
        assert!(!provider.masked_url().contains("secret"));
        assert!(provider.fallback_url.is_some());

        let err = RpcProvider::new(&config, 999).err().unwrap();
        assert_eq!(err.code_str(), "CFG_UNSUPPORTED_CHAIN");
    }

    #[test]
    fn test_rpc_error_classification() {
        let limited = RpcError {
            code: -32005,
            message: "Too many requests".to_string(),
        };
        assert!(limited.is_rate_limit());
        let other = RpcError {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert!(!other.is_rate_limit());
    }
}
