//! Telemetry
//!
//! Anonymous scan statistics: counts by label and kind, finding counts and
//! latency. No source text, names or addresses are stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::core::scanner::ScanReport;
use crate::models::types::{Label, ScanKind};

/// Single telemetry event (anonymized)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: u64,
    pub kind: ScanKind,
    pub label: Label,
    pub score: u8,
    pub findings: usize,
    pub latency_ms: u64,
    pub cached: bool,
}

impl TelemetryEvent {
    pub fn from_report(report: &ScanReport) -> Self {
        Self {
            timestamp: current_timestamp(),
            kind: report.kind,
            label: report.risk.label,
            score: report.risk.score,
            findings: report.findings.len(),
            latency_ms: report.latency_ms,
            cached: report.cached,
        }
    }
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TelemetryStats {
    pub total_scans: u64,
    pub source_scans: u64,
    pub bytecode_scans: u64,
    pub cache_hits: u64,
    pub safe: u64,
    pub suspicious: u64,
    pub tax_abuse_candidates: u64,
    /// Finding id -> count
    pub findings_by_kind: BTreeMap<String, u64>,
    pub avg_latency_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{:.2}\n",
            self.period_start,
            self.period_end,
            self.total_scans,
            self.source_scans,
            self.bytecode_scans,
            self.safe,
            self.suspicious,
            self.tax_abuse_candidates,
            self.avg_latency_ms,
        )
    }

}

pub struct TelemetryCollector {
    events: RwLock<Vec<TelemetryEvent>>,
    total_scans: AtomicU64,
    source_scans: AtomicU64,
    bytecode_scans: AtomicU64,
    cache_hits: AtomicU64,
    total_latency_ms: AtomicU64,
    label_counts: [AtomicU64; 3],
    finding_counts: RwLock<BTreeMap<String, u64>>,
    session_start: u64,
    export_dir: PathBuf,
    max_buffer_size: usize,
}

impl TelemetryCollector {
    /// The export directory is created lazily on first export
    pub fn with_config(export_dir: PathBuf, max_buffer_size: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            total_scans: AtomicU64::new(0),
            source_scans: AtomicU64::new(0),
            bytecode_scans: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            label_counts: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            finding_counts: RwLock::new(BTreeMap::new()),
            session_start: current_timestamp(),
            export_dir,
            max_buffer_size: max_buffer_size.max(1),
        }
    }

    fn label_slot(label: Label) -> usize {
        match label {
            Label::Safe => 0,
            Label::Suspicious => 1,
            Label::TaxAbuseCandidate => 2,
        }
    }

    pub fn record_scan(&self, report: &ScanReport) {
        self.total_scans.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(report.latency_ms, Ordering::Relaxed);
        match report.kind {
            ScanKind::Source => self.source_scans.fetch_add(1, Ordering::Relaxed),
            ScanKind::Bytecode => self.bytecode_scans.fetch_add(1, Ordering::Relaxed),
        };
        if report.cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.label_counts[Self::label_slot(report.risk.label)].fetch_add(1, Ordering::Relaxed);

        if let Ok(mut counts) = self.finding_counts.write() {
            for finding in &report.findings {
                *counts.entry(finding.kind.id().to_string()).or_insert(0) += 1;
            }
        }

        let mut to_flush = None;
        if let Ok(mut events) = self.events.write() {
            events.push(TelemetryEvent::from_report(report));
            if events.len() >= self.max_buffer_size {
                to_flush = Some(std::mem::take(&mut *events));
            }
        }
        // I/O happens outside the lock
        if let Some(events) = to_flush {
            if let Err(e) = self.flush_events(&events) {
                warn!("⚠️ Telemetry flush failed: {}", e);
            }
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        let total_scans = self.total_scans.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let avg_latency_ms = if total_scans > 0 {
            total_latency as f64 / total_scans as f64
        } else {
            0.0
        };

        TelemetryStats {
            total_scans,
            source_scans: self.source_scans.load(Ordering::Relaxed),
            bytecode_scans: self.bytecode_scans.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            safe: self.label_counts[0].load(Ordering::Relaxed),
            suspicious: self.label_counts[1].load(Ordering::Relaxed),
            tax_abuse_candidates: self.label_counts[2].load(Ordering::Relaxed),
            findings_by_kind: self
                .finding_counts
                .read()
                .map(|c| c.clone())
                .unwrap_or_default(),
            avg_latency_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    pub fn buffered_events(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn export_stats_json(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let path = self
            .export_dir
            .join(format!("stats_{}.json", current_timestamp()));
        fs::write(&path, self.get_stats().to_json())?;
        Ok(path)
    }

    /// Append the current stats to `telemetry_history.csv`
    pub fn export_stats_csv(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let path = self.export_dir.join("telemetry_history.csv");
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            writeln!(
                file,
                "period_start,period_end,total_scans,source_scans,bytecode_scans,safe,suspicious,tax_abuse_candidates,avg_latency_ms"
            )?;
        }
        write!(file, "{}", self.get_stats().to_csv_row())?;
        Ok(path)
    }

    /// Write out whatever is buffered
    pub fn flush(&self) -> Result<(), std::io::Error> {
        let events = match self.events.write() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => return Ok(()),
        };
        self.flush_events(&events)
    }

    fn flush_events(&self, events: &[TelemetryEvent]) -> Result<(), std::io::Error> {
        if events.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.export_dir)?;
        let path = self
            .export_dir
            .join(format!("events_{}.jsonl", current_timestamp()));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for event in events {
            writeln!(file, "{}", serde_json::to_string(event)?)?;
        }
        Ok(())
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
