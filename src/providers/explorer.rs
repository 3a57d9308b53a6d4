//! Etherscan V2 client - verified source lookup
//!
//! API: https://api.etherscan.io/v2/api?chainid=..&module=contract&action=getsourcecode
//! One key covers every supported chain.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::config::ScannerConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::SourceFile;
use crate::providers::rpc::{parse_address, RpcProvider};
use crate::utils::constants::{is_chain_supported, ENV_ETHERSCAN_API_KEY, ETHERSCAN_V2_URL};

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceEntry {
    #[serde(default)]
    source_code: String,
    #[serde(default)]
    contract_name: String,
    #[serde(default)]
    compiler_version: String,
}

/// Verified source as published on the explorer
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSource {
    pub contract_name: String,
    pub compiler_version: String,
    pub files: Vec<SourceFile>,
}

pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExplorerClient {
    pub fn new(config: &ScannerConfig) -> AppResult<Self> {
        let api_key = config
            .etherscan_api_key
            .clone()
            .ok_or_else(|| AppError::missing_api_key(ENV_ETHERSCAN_API_KEY))?;
        let client = Self {
            client: RpcProvider::build_client(config.rpc_timeout.max(Duration::from_secs(15)))?,
            base_url: ETHERSCAN_V2_URL.to_string(),
            api_key,
        };
        Ok(match &config.explorer_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Point at another Etherscan-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn get_source(&self, chain_id: u64, address: &str) -> AppResult<VerifiedSource> {
        if !is_chain_supported(chain_id) {
            return Err(AppError::unsupported_chain(chain_id));
        }
        let address = parse_address(address)?.to_string();
        info!("🔍 Explorer: fetching source for {} on chain {}", address, chain_id);

        let chain = chain_id.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("chainid", chain.as_str()),
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::explorer(format!("Explorer request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::explorer(format!("Explorer HTTP error: {}", response.status())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::explorer(format!("Explorer read failed: {}", e)))?;
        parse_response(&body, &address)
    }
}

/// Decode a `getsourcecode` response body
pub fn parse_response(body: &str, address: &str) -> AppResult<VerifiedSource> {
    let response: ExplorerResponse = serde_json::from_str(body)
        .map_err(|e| AppError::explorer(format!("Malformed explorer response: {}", e)))?;

    if response.status != "1" {
        let detail = response.result.as_str().unwrap_or(&response.message);
        return Err(AppError::explorer(format!("Explorer error: {}", detail)));
    }

    let entry: SourceEntry = match response.result {
        Value::Array(mut items) if !items.is_empty() => serde_json::from_value(items.remove(0))
            .map_err(|e| AppError::explorer(format!("Malformed source entry: {}", e)))?,
        _ => return Err(AppError::not_verified(address)),
    };

    if entry.source_code.trim().is_empty() {
        return Err(AppError::not_verified(address));
    }

    let files = parse_source_code(&entry.source_code, &entry.contract_name)?;
    debug!("📄 {} source files for {}", files.len(), entry.contract_name);
    Ok(VerifiedSource {
        contract_name: entry.contract_name,
        compiler_version: entry.compiler_version,
        files,
    })
}

/// Split the `SourceCode` field into files.
///
/// Three shapes occur: plain Solidity text, standard-JSON input wrapped in
/// an extra pair of braces (`{{ ... }}`), and a bare
/// `{"File.sol": {"content": ...}}` map.
pub fn parse_source_code(raw: &str, contract_name: &str) -> AppResult<Vec<SourceFile>> {
    let trimmed = raw.trim();

    let json_text = if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        Some(&trimmed[1..trimmed.len() - 1])
    } else if trimmed.starts_with('{') {
        Some(trimmed)
    } else {
        None
    };

    if let Some(text) = json_text {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            let sources = value.get("sources").unwrap_or(&value);
            let files = files_from_map(sources);
            if !files.is_empty() {
                return Ok(files);
            }
        }
    }

    let name = if contract_name.is_empty() { "Contract" } else { contract_name };
    Ok(vec![SourceFile {
        path: format!("{}.sol", name),
        content: raw.to_string(),
    }])
}

fn files_from_map(value: &Value) -> Vec<SourceFile> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    sorted
        .into_iter()
        .filter_map(|(path, entry)| {
            let content = entry.get("content")?.as_str()?;
            Some(SourceFile {
                path: path.clone(),
                content: content.to_string(),
            })
        })
        .collect()
}
