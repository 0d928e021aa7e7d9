//! Periodic compliance reports.
//!
//! The sweep evaluates every store whose version moved since its last report
//! and keeps the latest report per key for `laws.report`.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use lens_laws::{LawEngine, Violation};
use lens_registry::{RegistryError, StoreRegistry};
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::{COMPLIANCE_SWEEP_DURATION_SECONDS, LAW_EVALUATIONS_TOTAL};

/// Law evaluation of one store version.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    /// Store key.
    pub key: String,
    /// Version that was evaluated.
    pub version: u64,
    /// Compliance score, 0..=100.
    pub score: u8,
    /// Violations found.
    pub violations: Vec<Violation>,
    /// Laws that ran.
    pub evaluated_laws: Vec<String>,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
}

/// Latest report per store key.
#[derive(Default)]
pub struct ReportBook {
    reports: RwLock<HashMap<String, ComplianceReport>>,
}

impl ReportBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest report for `key`.
    pub fn latest(&self, key: &str) -> Option<ComplianceReport> {
        self.reports.read().get(key).cloned()
    }

    /// Number of keys with a report.
    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    /// Whether no report has been recorded.
    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    /// Store `report` as the latest for its key.
    pub fn record(&self, report: ComplianceReport) {
        let _ = self.reports.write().insert(report.key.clone(), report);
    }

    /// Drop reports for keys not in `live`.
    pub fn retain_keys(&self, live: &HashSet<&str>) {
        self.reports.write().retain(|key, _| live.contains(key.as_str()));
    }

    fn reported_version(&self, key: &str) -> Option<u64> {
        self.reports.read().get(key).map(|r| r.version)
    }
}

/// Evaluate every store whose version changed since its last report.
///
/// Returns the fresh reports, in key order. Stores removed mid-sweep are
/// skipped; laws that fault are already folded into the report as
/// violations, so only an unknown law in a store's selection is logged.
pub fn sweep(registry: &StoreRegistry, engine: &LawEngine, book: &ReportBook) -> Vec<ComplianceReport> {
    let start = Instant::now();
    let keys = registry.list_keys();
    let mut fresh = Vec::new();

    for key in &keys {
        let current = match registry.get(key) {
            Ok(snapshot) => snapshot.version,
            Err(_) => continue,
        };
        if book.reported_version(key) == Some(current) {
            continue;
        }
        match registry.evaluate(key, None, engine) {
            Ok((snapshot, evaluation)) => {
                counter!(LAW_EVALUATIONS_TOTAL, "source" => "sweep").increment(1);
                let report = ComplianceReport {
                    key: snapshot.key,
                    version: snapshot.version,
                    score: evaluation.score,
                    violations: evaluation.violations,
                    evaluated_laws: evaluation.evaluated_laws,
                    generated_at: Utc::now(),
                };
                book.record(report.clone());
                fresh.push(report);
            }
            Err(RegistryError::NotFound { .. }) => {}
            Err(e) => warn!(key, error = %e, "compliance evaluation failed"),
        }
    }

    book.retain_keys(&keys.iter().map(String::as_str).collect());
    histogram!(COMPLIANCE_SWEEP_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
    debug!(stores = keys.len(), reports = fresh.len(), "compliance sweep finished");
    fresh
}
