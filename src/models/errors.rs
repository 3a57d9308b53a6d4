//! Centralized Error Handling Module
//!
//! Every failure carries a unique, stable error code so CLI output, API
//! responses and logs can be correlated.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - INPUT_xxx: malformed scan input
//! - PARSE_xxx: Solidity lexing/parsing problems
//! - MODEL_xxx: scoring model load/train errors
//! - RPC_xxx / EXPLORER_xxx: upstream services
//! - API_xxx: HTTP API errors
//! - CFG_xxx: Configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Input Errors
    // ============================================
    /// Empty source or bytecode
    InputEmpty,
    /// Input exceeds configured size limit
    InputTooLarge,
    /// Bytecode is not valid hex
    InputInvalidHex,
    /// Address is not a valid 20-byte hex address
    InputInvalidAddress,

    // ============================================
    // Parse Errors
    // ============================================
    /// Block comment never closed
    ParseUnterminatedComment,
    /// String literal never closed
    ParseUnterminatedString,
    /// No contract/library/interface definition found
    ParseNoContract,

    // ============================================
    // Target Errors
    // ============================================
    /// Address has no deployed code
    TargetNotContract,
    /// Explorer has no verified source for the address
    ContractNotVerified,

    // ============================================
    // Model Errors
    // ============================================
    /// Model file could not be read or decoded
    ModelLoadFailed,
    /// Model references a feature the extractor does not produce
    ModelUnknownFeature,
    /// Training or evaluation set is empty
    ModelEmptyDataset,

    // ============================================
    // Upstream Service Errors
    // ============================================
    /// Block explorer API error
    ExplorerError,
    /// RPC returned error response
    RpcError,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,

    // ============================================
    // API Errors
    // ============================================
    /// Invalid request format
    ApiBadRequest,
    /// Unauthorized (invalid API key)
    ApiUnauthorized,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing API key
    ConfigMissingApiKey,
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Unsupported chain ID
    ConfigUnsupportedChain,

    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputEmpty => "INPUT_EMPTY",
            Self::InputTooLarge => "INPUT_TOO_LARGE",
            Self::InputInvalidHex => "INPUT_INVALID_HEX",
            Self::InputInvalidAddress => "INPUT_INVALID_ADDRESS",

            Self::ParseUnterminatedComment => "PARSE_UNTERMINATED_COMMENT",
            Self::ParseUnterminatedString => "PARSE_UNTERMINATED_STRING",
            Self::ParseNoContract => "PARSE_NO_CONTRACT",

            Self::TargetNotContract => "TARGET_NOT_CONTRACT",
            Self::ContractNotVerified => "CONTRACT_NOT_VERIFIED",

            Self::ModelLoadFailed => "MODEL_LOAD_FAILED",
            Self::ModelUnknownFeature => "MODEL_UNKNOWN_FEATURE",
            Self::ModelEmptyDataset => "MODEL_EMPTY_DATASET",

            Self::ExplorerError => "EXPLORER_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",

            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiUnauthorized => "API_UNAUTHORIZED",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::ConfigMissingApiKey => "CFG_MISSING_API_KEY",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigUnsupportedChain => "CFG_UNSUPPORTED_CHAIN",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InputEmpty
            | Self::InputInvalidHex
            | Self::InputInvalidAddress
            | Self::ApiBadRequest
            | Self::ConfigInvalidValue
            | Self::ConfigUnsupportedChain => 400,
            Self::ApiUnauthorized => 401,
            Self::ContractNotVerified | Self::TargetNotContract => 404,
            Self::InputTooLarge => 413,
            Self::ParseNoContract
            | Self::ParseUnterminatedComment
            | Self::ParseUnterminatedString => 422,
            Self::ApiRateLimited | Self::RpcRateLimited => 429,
            Self::ExplorerError | Self::RpcError | Self::RpcTimeout => 502,
            _ => 500,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout | Self::RpcRateLimited | Self::RpcError | Self::ExplorerError
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InputEmpty, msg)
    }

    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::new(
            ErrorCode::InputTooLarge,
            format!("Input is {} bytes, limit is {} bytes", size, limit),
        )
    }

    pub fn invalid_hex(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InputInvalidHex, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InputInvalidAddress, msg)
    }

    pub fn no_contract(target: &str) -> Self {
        Self::new(
            ErrorCode::ParseNoContract,
            format!("No contract, library or interface found in {}", target),
        )
    }

    pub fn not_contract(address: &str) -> Self {
        Self::new(
            ErrorCode::TargetNotContract,
            format!("No code deployed at {}", address),
        )
    }

    pub fn not_verified(address: &str) -> Self {
        Self::new(
            ErrorCode::ContractNotVerified,
            format!("Contract {} has no verified source", address),
        )
    }

    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelLoadFailed, msg)
    }

    pub fn unknown_feature(name: &str) -> Self {
        Self::new(
            ErrorCode::ModelUnknownFeature,
            format!("Model references unknown feature '{}'", name),
        )
    }

    pub fn empty_dataset() -> Self {
        Self::new(ErrorCode::ModelEmptyDataset, "Dataset contains no examples")
    }

    pub fn explorer(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExplorerError, msg)
    }

    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcError, msg)
    }

    pub fn rpc_rate_limited() -> Self {
        Self::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)")
    }

    pub fn unsupported_chain(chain_id: u64) -> Self {
        Self::new(
            ErrorCode::ConfigUnsupportedChain,
            format!("Unsupported chain_id: {}", chain_id),
        )
    }

    pub fn missing_api_key(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingApiKey,
            format!("Missing API key: {}", key_name),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, format!("IO error: {}", err), err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            Self::rpc_rate_limited()
        } else {
            Self::with_source(ErrorCode::RpcError, "Upstream request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::ModelLoadFailed, format!("JSON error: {}", err), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::no_contract("Token.sol");
        assert_eq!(err.code, ErrorCode::ParseNoContract);
        assert_eq!(err.code_str(), "PARSE_NO_CONTRACT");
        assert!(err.to_string().starts_with("[PARSE_NO_CONTRACT]"));
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::RpcTimeout.is_retryable());
        assert!(ErrorCode::RpcRateLimited.is_retryable());
        assert!(!ErrorCode::ParseNoContract.is_retryable());
        assert!(!ErrorCode::ContractNotVerified.is_retryable());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::ApiBadRequest.http_status(), 400);
        assert_eq!(ErrorCode::InputTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::ParseNoContract.http_status(), 422);
        assert_eq!(ErrorCode::ApiRateLimited.http_status(), 429);
        assert_eq!(ErrorCode::ExplorerError.http_status(), 502);
        assert_eq!(ErrorCode::Unknown.http_status(), 500);
    }
}
