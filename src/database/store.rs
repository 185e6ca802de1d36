use crate::database::migrations::StoredLedger;
use crate::database::models::{Ledger, PeriodKey};
use chrono::Utc;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read ledger from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write ledger to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON file holding the ledger. Saves go through a temp file in the same
/// directory and an atomic rename, so a failed write leaves the old file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty ledger. A file that does not decode is
    /// moved aside and replaced by an empty ledger. Any other read error is
    /// returned so the live file is never overwritten.
    pub fn load(&self, fallback_period: &PeriodKey) -> Result<Ledger, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No ledger at {}, starting empty", self.path.display());
                return Ok(Ledger::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(Ledger::default());
        }

        match StoredLedger::decode(&raw) {
            Ok(stored) => Ok(stored.into_ledger(fallback_period)),
            Err(e) => {
                warn!("Ledger {} is corrupt, starting empty: {}", self.path.display(), e);
                self.quarantine();
                Ok(Ledger::default())
            }
        }
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(ledger)?;
        self.write_atomically(&encoded).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// `<file>.corrupt-<UTC timestamp>`, so earlier quarantined files survive.
    fn corrupt_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", stamp));
        let candidate = PathBuf::from(&name);
        if !candidate.exists() {
            return candidate;
        }

        (1u32..)
            .map(|n| {
                let mut numbered = name.clone();
                numbered.push(format!("-{}", n));
                PathBuf::from(numbered)
            })
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }

    fn quarantine(&self) {
        let target = self.corrupt_path();
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!("Moved unreadable ledger to {}", target.display()),
            Err(e) => warn!("Failed to move unreadable ledger aside: {}", e),
        }
    }
}
