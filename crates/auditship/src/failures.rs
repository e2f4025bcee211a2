//! Failure ledger
//!
//! Append-only record of per-subtree failures, drained for reporting at the
//! end of a run. Never consulted to alter control flow.

/// One failed resource and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub resource_path: String,
    pub reason: String,
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed processing audit logs for {}: {}",
            self.resource_path, self.reason
        )
    }
}

#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource_path: &str, error: &anyhow::Error) {
        self.records.push(FailureRecord {
            resource_path: resource_path.to_string(),
            reason: format!("{error:#}"),
        });
    }

    pub fn entries(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn drain(self) -> Vec<FailureRecord> {
        self.records
    }
}
