//! Broker CSV importers.
//!
//! Each broker export format gets one `CsvImporter`; the registry picks the
//! importer by exchange id.

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{ExchangeId, PositionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod bybit;

pub use bybit::BybitCsvImporter;

/// Why an import stopped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Malformed CSV file: {0}")]
    Malformed(String),
    #[error("CSV file has no data rows")]
    Empty,
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid date {value:?} on line {line}")]
    InvalidDate { line: u64, value: String },
    #[error("Invalid number {value:?} in column {column} on line {line}")]
    InvalidNumber {
        line: u64,
        column: String,
        value: String,
    },
    #[error("There is no data with the specified parameters")]
    NoData,
    #[error("Storage error: {0}")]
    Store(String),
}

/// A failed import. Rows written before the failure stay written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason} ({inserted} rows imported)")]
pub struct ImportFailure {
    pub inserted: u64,
    pub reason: ImportError,
}

impl ImportFailure {
    pub fn new(inserted: u64, reason: ImportError) -> Self {
        Self { inserted, reason }
    }
}

impl From<ImportError> for ImportFailure {
    fn from(reason: ImportError) -> Self {
        ImportFailure::new(0, reason)
    }
}

/// Target and filter for one upload. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub position: PositionId,
    pub contract: String,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl ImportRequest {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.stop.map_or(true, |stop| at <= stop)
    }
}

/// Importer for one broker's transaction export.
///
/// Implementations insert idempotently and return the number of new rows.
#[async_trait]
pub trait CsvImporter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    async fn import(&self, request: &ImportRequest, data: &[u8]) -> Result<u64, ImportFailure>;
}

/// Importers keyed by exchange id.
#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: HashMap<ExchangeId, Arc<dyn CsvImporter>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in importer under its configured exchange id.
    pub fn with_defaults(config: &Config, repo: Arc<Repository>) -> Self {
        let mut registry = Self::new();
        registry.register(config.bybit_exchange_id, Arc::new(BybitCsvImporter::new(repo)));
        registry
    }

    pub fn register(&mut self, exchange: ExchangeId, importer: Arc<dyn CsvImporter>) {
        self.importers.insert(exchange, importer);
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<Arc<dyn CsvImporter>> {
        self.importers.get(&exchange).cloned()
    }
}

impl fmt::Debug for ImporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self
            .importers
            .iter()
            .map(|(id, importer)| (id.as_i64(), importer.name()))
            .collect();
        entries.sort();
        f.debug_struct("ImporterRegistry")
            .field("importers", &entries)
            .finish()
    }
}
