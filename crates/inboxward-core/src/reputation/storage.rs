//! Durable storage for sender records.
//!
//! The whole collection is written on every save. There is no atomic
//! replace: a crash mid-write can leave a truncated file, which the next
//! load treats as unparsable and replaces with an empty store.
//!
//! Files in the older layout (`classifications` counts and a
//! `trusted_marketing_source` flag per address) are still readable and are
//! rewritten in the current layout on the next save.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::{SenderRecord, TrustState};
use crate::address::normalized_domain;

/// All sender records keyed by address.
pub type SenderMap = BTreeMap<String, SenderRecord>;

/// Errors from reading or writing the sender collection.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sender store not found at {0}")]
    NotFound(PathBuf),

    #[error("Failed to access sender store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sender store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Sender store write rejected: {0}")]
    WriteRejected(String),
}

/// Older record layout, before typed trust state.
#[derive(Debug, Deserialize)]
struct LegacySenderRecord {
    #[serde(default)]
    domain: String,
    classifications: BTreeMap<String, u32>,
    /// Naive local ISO timestamp, or empty
    #[serde(default)]
    last_seen: String,
    trusted_marketing_source: bool,
}

impl LegacySenderRecord {
    fn into_record(self, address: String) -> SenderRecord {
        let last_seen = parse_legacy_timestamp(&self.last_seen);
        let domain = if self.domain.is_empty() {
            normalized_domain(&address)
        } else {
            self.domain.to_lowercase()
        };
        // The old format kept no promotion time; last_seen is the closest bound.
        let trust = if self.trusted_marketing_source {
            TrustState::Trusted { since: last_seen }
        } else {
            TrustState::Untrusted
        };

        SenderRecord {
            address,
            domain,
            classification_counts: self.classifications,
            last_seen,
            trust,
        }
    }
}

fn parse_legacy_timestamp(value: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

/// Parse a sender collection in the current layout, falling back to the
/// legacy one. The current-layout error is reported if neither matches.
fn parse_records(contents: &str) -> Result<SenderMap, serde_json::Error> {
    let current_error = match serde_json::from_str::<SenderMap>(contents) {
        Ok(records) => return Ok(records),
        Err(e) => e,
    };

    match serde_json::from_str::<BTreeMap<String, LegacySenderRecord>>(contents) {
        Ok(legacy) => {
            info!(senders = legacy.len(), "Converting legacy sender store");
            Ok(legacy
                .into_iter()
                .map(|(address, record)| (address.clone(), record.into_record(address)))
                .collect())
        }
        Err(_) => Err(current_error),
    }
}

/// A keyed record collection persisted as a whole.
pub trait SenderStorage: Send {
    /// Read every record.
    fn load(&self) -> Result<SenderMap, StorageError>;

    /// Replace the durable collection with `records`.
    fn save(&mut self, records: &SenderMap) -> Result<(), StorageError>;

    /// Where the records live, for log output.
    fn location(&self) -> String;
}

/// Pretty-printed JSON file, one object keyed by sender address.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SenderStorage for JsonFileStorage {
    fn load(&self) -> Result<SenderMap, StorageError> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.clone()));
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        parse_records(&contents).map_err(|source| StorageError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&mut self, records: &SenderMap) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(records).map_err(|source| StorageError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory storage. Can be told to reject writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    records: SenderMap,
    reject_writes: bool,
    saves: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing collection.
    pub fn with_records(records: SenderMap) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail.
    pub fn rejecting_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// The last successfully saved collection.
    pub fn records(&self) -> &SenderMap {
        &self.records
    }
}

impl SenderStorage for MemoryStorage {
    fn load(&self) -> Result<SenderMap, StorageError> {
        Ok(self.records.clone())
    }

    fn save(&mut self, records: &SenderMap) -> Result<(), StorageError> {
        if self.reject_writes {
            return Err(StorageError::WriteRejected("memory storage is read-only".to_string()));
        }
        self.records = records.clone();
        self.saves += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
