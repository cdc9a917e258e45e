use log::{error, info, warn};

use crate::error::MigrateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Processed,
    Skipped,
    Failed,
}

/// Outcome of one resource or one record within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Namespaced path of the source resource
    pub resource: String,
    /// Record id within the resource (iid, user id); `None` for resource-level entries
    pub record: Option<u64>,
    pub status: Status,
    pub detail: String,
}

/// Per-run ledger of outcomes, logged as they happen and summarised at the end.
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&mut self, resource: &str, record: Option<u64>, detail: impl Into<String>) {
        let detail = detail.into();
        info!("{} {detail}", label(resource, record));
        self.push(resource, record, Status::Processed, detail);
    }

    pub fn skipped(&mut self, resource: &str, record: Option<u64>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("{} skipped: {reason}", label(resource, record));
        self.push(resource, record, Status::Skipped, reason);
    }

    pub fn failed(&mut self, resource: &str, record: Option<u64>, reason: impl std::fmt::Display) {
        let reason = reason.to_string();
        error!("{} failed: {reason}", label(resource, record));
        self.push(resource, record, Status::Failed, reason);
    }

    /// Record a failed item, noting when the upstream failure was transient
    /// so a rerun is likely to succeed.
    pub fn error(&mut self, resource: &str, record: Option<u64>, err: &MigrateError) {
        if err.is_transient() {
            self.failed(resource, record, format!("{err} (transient, rerun to retry)"));
        } else {
            self.failed(resource, record, err);
        }
    }

    fn push(&mut self, resource: &str, record: Option<u64>, status: Status, detail: String) {
        self.entries.push(ReportEntry {
            resource: resource.to_string(),
            record,
            status,
            detail,
        });
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn count(&self, status: Status) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.with_status(Status::Failed)
    }

    pub fn with_status(&self, status: Status) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }

    /// Record ids with the given status, in the order they were reported.
    #[cfg(test)]
    pub fn records(&self, status: Status) -> Vec<u64> {
        self.with_status(status).filter_map(|e| e.record).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Status::Failed) > 0
    }
}

fn label(resource: &str, record: Option<u64>) -> String {
    match record {
        Some(id) => format!("{resource} #{id}"),
        None => resource.to_string(),
    }
}
