//! Sequential execution of a write batch with per-row reporting.
//!
//! Each planned row either carries a statement or the validation error that
//! prevented building one. Statements run one at a time; a failure is recorded
//! and the batch moves on. Once the batch is done, successful edits are merged
//! into the snapshot and the session's cached reads are invalidated, whatever
//! the individual outcomes were.

use std::collections::BTreeSet;

use log::{info, warn};
use serde::Serialize;

use crate::{
    error::RowError,
    normalize::Record,
    session::Session,
    source::DataSource,
    statement::Statement,
};

/// One row's planned write.
#[derive(Debug, Clone)]
pub struct PlannedWrite {
    pub key: String,
    pub statement: Result<Statement, RowError>,
    /// Record to merge into the snapshot if the write succeeds.
    pub record: Option<Record>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Saved,
    Invalid,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowReport {
    pub key: String,
    pub kind: ReportKind,
    pub message: String,
}

impl RowReport {
    pub fn is_success(&self) -> bool {
        self.kind == ReportKind::Saved
    }

    /// Validation errors have no statement and are reported against the key;
    /// write errors use the statement's `failure` prefix.
    fn rejected(key: &str, failure: Option<&str>, error: &RowError) -> Self {
        let (kind, message) = if error.is_validation() {
            (ReportKind::Invalid, format!("Invalid row for {key}: {error}"))
        } else {
            let prefix = failure
                .map(str::to_string)
                .unwrap_or_else(|| format!("Error processing {key}"));
            (ReportKind::Failed, format!("{prefix}: {error}"))
        };
        Self {
            key: key.to_string(),
            kind,
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub rows: Vec<RowReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }

    pub fn accepted_keys(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn table_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                let status = match r.kind {
                    ReportKind::Saved => "saved",
                    ReportKind::Invalid => "invalid",
                    ReportKind::Failed => "failed",
                };
                vec![r.key.clone(), status.to_string(), r.message.clone()]
            })
            .collect()
    }
}

/// Result of reconciling an edited grid: either nothing to do, or a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum ApplyOutcome {
    NoChanges,
    Applied(BatchReport),
}

impl ApplyOutcome {
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            ApplyOutcome::NoChanges => None,
            ApplyOutcome::Applied(report) => Some(report),
        }
    }
}

/// Runs `batch` in order against `source`, then merges accepted edits into the
/// snapshot and invalidates the session.
pub fn execute_batch(
    session: &mut Session,
    source: &mut dyn DataSource,
    batch: Vec<PlannedWrite>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut accepted = Vec::new();
    for planned in batch {
        let statement = match planned.statement {
            Ok(statement) => statement,
            Err(error) => {
                warn!("Skipping {}: {error}", planned.key);
                report.rows.push(RowReport::rejected(&planned.key, None, &error));
                continue;
            }
        };
        match source.execute(&statement) {
            Ok(_) => {
                info!("{}", statement.label);
                report.rows.push(RowReport {
                    key: planned.key,
                    kind: ReportKind::Saved,
                    message: statement.label,
                });
                if let Some(record) = planned.record {
                    accepted.push(record);
                }
            }
            Err(err) => {
                let error = RowError::Write(format!("{err:#}"));
                warn!("{} failed: {error}", statement.label);
                report.rows.push(RowReport::rejected(
                    &planned.key,
                    Some(&statement.failure),
                    &error,
                ));
            }
        }
    }
    session.snapshot.merge(accepted);
    session.invalidate();
    info!(
        "Batch finished: {} saved, {} rejected",
        report.succeeded(),
        report.failed()
    );
    report
}
