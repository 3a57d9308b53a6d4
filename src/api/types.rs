//! API Request/Response Types

use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::core::scanner::ScanReport;
use crate::models::errors::{AppError, ErrorCode};
use crate::models::types::{ScanKind, SourceFile};
use crate::utils::cache::CacheStats;
use crate::utils::telemetry::TelemetryStats;

/// Maximum items per batch request
pub const MAX_BATCH_ITEMS: usize = 100;

/// Upper bound for batch concurrency
pub const MAX_BATCH_CONCURRENCY: usize = 16;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Error body inside the envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            code: "API_UNAUTHORIZED".to_string(),
            message: "Invalid API key".to_string(),
            details: None,
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: "API_RATE_LIMITED".to_string(),
            message: format!("Rate limit exceeded. Retry after {} seconds", retry_after),
            details: Some(format!("retry_after: {}", retry_after)),
        }
    }

    pub fn payload_too_large() -> Self {
        Self {
            code: ErrorCode::InputTooLarge.as_str().to_string(),
            message: "Request body exceeds the size limit".to_string(),
            details: None,
        }
    }

    /// Envelope for a rejection produced outside the handlers
    pub fn rejected(status: StatusCode) -> Self {
        Self {
            code: ErrorCode::ApiBadRequest.as_str().to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("Request rejected")
                .to_string(),
            details: None,
        }
    }
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code_str().to_string(),
            message: err.message.clone(),
            details: None,
        }
    }
}

/// Error half of every handler result
pub type ApiFailure = (StatusCode, Json<ApiResponse<()>>);

pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Map an `AppError` to its HTTP status and envelope
pub fn failure(err: &AppError, start: Instant) -> ApiFailure {
    let status = StatusCode::from_u16(err.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::error(err.into(), elapsed_ms(start))))
}

/// Unwrap a JSON body, answering malformed or oversized bodies with the envelope
pub fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    start: Instant,
) -> Result<T, ApiFailure> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ApiResponse::error(ApiError::payload_too_large(), elapsed_ms(start))),
        )),
        Err(rejection) => Err(failure(&AppError::bad_request(rejection.body_text()), start)),
    }
}

// ============================================
// Requests
// ============================================

/// Either a single `source` text or a set of `files`
#[derive(Debug, Deserialize)]
pub struct ScanSourceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<SourceFile>>,
}

#[derive(Debug, Deserialize)]
pub struct ScanBytecodeRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub bytecode: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanAddressRequest {
    pub address: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// `source` (default) or `bytecode`
    #[serde(default)]
    pub mode: Option<ScanKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchScanRequest {
    pub items: Vec<BatchItem>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

// ============================================
// Responses
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub telemetry: TelemetryStats,
    pub cache: CacheStats,
    pub model_version: String,
    pub uptime_seconds: u64,
    pub api_version: String,
}

#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub name: String,
    /// `success` or `error`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ScanReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl BatchItemResult {
    pub fn failed(index: usize, name: String, err: &AppError) -> Self {
        Self {
            index,
            name,
            status: "error".to_string(),
            report: None,
            error: Some(ApiError::from(err)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchScanData {
    pub total_requested: usize,
    pub total_processed: usize,
    pub safe: usize,
    pub suspicious: usize,
    pub tax_abuse_candidates: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
    pub processing_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_mapping() {
        let start = Instant::now();
        let (status, Json(body)) = failure(&AppError::no_contract("x.sol"), start);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body.success);
        assert_eq!(body.error.unwrap().code, "PARSE_NO_CONTRACT");

        let (status, _) = failure(&AppError::too_large(10, 5), start);
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let (status, _) = failure(&AppError::explorer("down"), start);
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::success(1u8, 0.5)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 1);
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_address_request_mode() {
        let req: ScanAddressRequest =
            serde_json::from_str(r#"{"address":"0x00","mode":"bytecode"}"#).unwrap();
        assert_eq!(req.mode, Some(ScanKind::Bytecode));
        assert!(req.chain_id.is_none());
    }
}
