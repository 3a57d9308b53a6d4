//! API Request Handlers

use axum::extract::{rejection::JsonRejection, Json, State};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::middleware::RateLimiter;
use super::types::*;
use crate::core::checklist::{ChecklistItem, CHECKLIST};
use crate::core::scanner::{ScanReport, TaxScanner};
use crate::models::config::ScannerConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Label, ScanKind};
use crate::utils::constants::APP_VERSION;

/// Shared application state
pub struct AppState {
    pub scanner: Arc<TaxScanner>,
    pub rate_limiter: RateLimiter,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(scanner: TaxScanner) -> Self {
        Self::with_rate_limiter(scanner, RateLimiter::default())
    }

    pub fn with_rate_limiter(scanner: TaxScanner, rate_limiter: RateLimiter) -> Self {
        Self {
            scanner: Arc::new(scanner),
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiFailure>;

/// Run a synchronous scan off the async runtime
async fn run_blocking<F>(scanner: Arc<TaxScanner>, job: F) -> AppResult<ScanReport>
where
    F: FnOnce(&TaxScanner) -> AppResult<ScanReport> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&scanner))
        .await
        .map_err(|e| AppError::internal(format!("Scan task failed: {}", e)))?
}

fn respond(result: AppResult<ScanReport>, start: Instant) -> ApiResult<ScanReport> {
    match result {
        Ok(report) => Ok(Json(ApiResponse::success(report, elapsed_ms(start)))),
        Err(e) => {
            warn!("❌ Scan rejected: {}", e);
            Err(failure(&e, start))
        }
    }
}

// ============================================
// Health & Status
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();
    let cache = state.scanner.cache().stats();

    info!(
        "📊 Cache Stats: {} entries, {:.1}% hit rate ({} hits / {} misses)",
        cache.entries, cache.hit_rate, cache.hits, cache.misses
    );

    let data = StatsData {
        telemetry: state.scanner.telemetry().get_stats(),
        cache,
        model_version: state.scanner.model().version.clone(),
        uptime_seconds: state.uptime_seconds(),
        api_version: APP_VERSION.to_string(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

pub async fn get_checklist() -> Json<ApiResponse<Vec<ChecklistItem>>> {
    let start = Instant::now();
    Json(ApiResponse::success(CHECKLIST.to_vec(), elapsed_ms(start)))
}

// ============================================
// Scans
// ============================================

pub async fn scan_source(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScanSourceRequest>, JsonRejection>,
) -> ApiResult<ScanReport> {
    let start = Instant::now();
    let req = json_body(payload, start)?;
    let name = req.name.unwrap_or_else(|| "input.sol".to_string());

    let result = match (req.source, req.files) {
        (Some(source), None) => {
            run_blocking(state.scanner.clone(), move |s| s.scan_source(&name, &source)).await
        }
        (None, Some(files)) => {
            run_blocking(state.scanner.clone(), move |s| s.scan_sources(&name, &files)).await
        }
        _ => Err(AppError::bad_request(
            "Provide exactly one of `source` or `files`",
        )),
    };
    respond(result, start)
}

pub async fn scan_bytecode(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScanBytecodeRequest>, JsonRejection>,
) -> ApiResult<ScanReport> {
    let start = Instant::now();
    let req = json_body(payload, start)?;
    let name = req.name.unwrap_or_else(|| "bytecode".to_string());
    let code = req.bytecode;

    let result = run_blocking(state.scanner.clone(), move |s| s.scan_bytecode(&name, &code)).await;
    respond(result, start)
}

pub async fn scan_address(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScanAddressRequest>, JsonRejection>,
) -> ApiResult<ScanReport> {
    let start = Instant::now();
    let req = json_body(payload, start)?;
    let chain_id = req.chain_id.unwrap_or_else(ScannerConfig::default_chain);
    let mode = req.mode.unwrap_or(ScanKind::Source);

    info!("🔍 Address scan {} on chain {} ({})", req.address, chain_id, mode.as_str());
    let result = state.scanner.scan_address(&req.address, chain_id, mode).await;
    respond(result, start)
}

// ============================================
// Batch
// ============================================

type BatchHandle = (usize, String, JoinHandle<BatchItemResult>);

/// Await every item in order; a task that died still yields an error entry
async fn collect_batch(handles: Vec<BatchHandle>) -> Vec<BatchItemResult> {
    let mut results = Vec::with_capacity(handles.len());
    for (index, name, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("⚠️ Batch task for {} panicked: {}", name, e);
                let err = AppError::internal(format!("Scan task failed: {}", e));
                results.push(BatchItemResult::failed(index, name, &err));
            }
        }
    }
    results
}

pub async fn batch_scan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchScanRequest>, JsonRejection>,
) -> ApiResult<BatchScanData> {
    let start = Instant::now();
    let req = json_body(payload, start)?;

    if req.items.is_empty() {
        return Err(failure(&AppError::bad_request("items array cannot be empty"), start));
    }
    if req.items.len() > MAX_BATCH_ITEMS {
        return Err(failure(
            &AppError::bad_request(format!("Maximum {} items per batch request", MAX_BATCH_ITEMS)),
            start,
        ));
    }

    let concurrency = req.concurrency.clamp(1, MAX_BATCH_CONCURRENCY);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let total_requested = req.items.len();
    let mut handles: Vec<BatchHandle> = Vec::with_capacity(total_requested);

    for (index, item) in req.items.into_iter().enumerate() {
        let sem = semaphore.clone();
        let scanner = state.scanner.clone();
        let BatchItem { name, source } = item;
        let name = name.unwrap_or_else(|| format!("item-{}.sol", index));
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let outcome = match sem.acquire_owned().await {
                Ok(_permit) => {
                    let item_name = name.clone();
                    run_blocking(scanner, move |s| s.scan_source(&item_name, &source)).await
                }
                Err(e) => Err(AppError::internal(format!("Batch semaphore closed: {}", e))),
            };
            match outcome {
                Ok(report) => BatchItemResult {
                    index,
                    name,
                    status: "success".to_string(),
                    report: Some(report),
                    error: None,
                },
                Err(e) => BatchItemResult::failed(index, name, &e),
            }
        });
        handles.push((index, task_name, handle));
    }

    let results = collect_batch(handles).await;

    let count = |label: Label| {
        results
            .iter()
            .filter_map(|r| r.report.as_ref())
            .filter(|r| r.risk.label == label)
            .count()
    };
    let safe = count(Label::Safe);
    let suspicious = count(Label::Suspicious);
    let tax_abuse_candidates = count(Label::TaxAbuseCandidate);
    let failed = results.iter().filter(|r| r.report.is_none()).count();

    info!(
        "📦 Batch of {} done: {} safe, {} suspicious, {} candidates, {} failed",
        total_requested, safe, suspicious, tax_abuse_candidates, failed
    );

    let data = BatchScanData {
        total_requested,
        total_processed: results.len(),
        safe,
        suspicious,
        tax_abuse_candidates,
        failed,
        results,
        processing_time_ms: elapsed_ms(start),
    };

    Ok(Json(ApiResponse::success(data, elapsed_ms(start))))
}
