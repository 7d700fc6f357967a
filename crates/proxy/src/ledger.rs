use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// In-memory usage counts, connection string -> times assigned.
///
/// The count reflects assignments, not attempt outcomes.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    counts: HashMap<String, u32>,
}

impl UsageLedger {
    pub fn count(&self, connection: &str) -> u32 {
        self.counts.get(connection).copied().unwrap_or(0)
    }

    /// Bump the count for an assignment and return the new value.
    pub fn increment(&mut self, connection: &str) -> u32 {
        let entry = self.counts.entry(connection.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Flat-JSON persistence for the ledger: read fully at load, rewritten
/// fully on every update.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing file is an empty ledger; a corrupt or
    /// unreadable one resets to empty with a warning, never an abort.
    pub fn load(&self) -> UsageLedger {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return UsageLedger::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "usage ledger unreadable, starting empty");
                return UsageLedger::default();
            }
        };

        match serde_json::from_str::<HashMap<String, u32>>(&raw) {
            Ok(counts) => UsageLedger { counts },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "usage ledger corrupt, starting empty");
                UsageLedger::default()
            }
        }
    }

    pub fn save(&self, ledger: &UsageLedger) -> Result<(), LedgerError> {
        let body = serde_json::to_string_pretty(&ledger.counts)?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}
