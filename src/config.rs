//! Runtime configuration for the export/import operations.
//!
//! A [`HelperConfig`] decides which database is opened, where export files
//! are written, the size ceiling for uploaded documents, and whether each
//! imported aggregate is written inside a single transaction.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    errors::BookingsHelperError, import::DEFAULT_MAX_DOCUMENT_BYTES, import::ImportOptions,
    store::BookingStore,
};

pub const DB_ENV: &str = "BOOKINGS_HELPER_DB";
pub const EXPORT_DIR_ENV: &str = "BOOKINGS_HELPER_EXPORT_DIR";
pub const MAX_BYTES_ENV: &str = "BOOKINGS_HELPER_MAX_BYTES";
pub const ATOMIC_ENV: &str = "BOOKINGS_HELPER_ATOMIC";

/// Where the store lives.
///
/// ```rust
/// use bookings_helper::DatabaseLocation;
///
/// assert_eq!(DatabaseLocation::parse("memory"), DatabaseLocation::Memory);
/// assert_eq!(
///     DatabaseLocation::parse("shop.db"),
///     DatabaseLocation::Path("shop.db".into())
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Fresh in-memory database, gone when the process exits.
    #[default]
    Memory,
    /// SQLite database file, created when missing.
    Path(PathBuf),
}

impl DatabaseLocation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "memory" | ":memory:" => DatabaseLocation::Memory,
            path => DatabaseLocation::Path(PathBuf::from(path)),
        }
    }
}

/// Configuration shared by every operation.
///
/// # Default Configuration
///
/// ```rust
/// use bookings_helper::{DatabaseLocation, HelperConfig};
///
/// let config = HelperConfig::default();
/// assert_eq!(config.database, DatabaseLocation::Memory);
/// assert_eq!(config.max_document_bytes, 1_000_000);
/// assert!(config.atomic_import);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelperConfig {
    pub database: DatabaseLocation,
    /// Directory export files are written to.
    ///
    /// **Default:** the current directory
    pub export_dir: PathBuf,
    /// Largest accepted upload or container entry, in bytes.
    ///
    /// **Default:** `1_000_000`
    pub max_document_bytes: u64,
    /// Write each imported aggregate inside one transaction.
    ///
    /// When `false`, rows already inserted for a failing aggregate stay behind.
    ///
    /// **Default:** `true`
    pub atomic_import: bool,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            export_dir: PathBuf::from("."),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            atomic_import: true,
        }
    }
}

impl HelperConfig {
    /// Defaults overlaid with the `BOOKINGS_HELPER_*` environment variables.
    pub fn from_env() -> Result<Self, BookingsHelperError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`HelperConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BookingsHelperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(db) = lookup(DB_ENV) {
            config.database = DatabaseLocation::parse(&db);
        }
        if let Some(dir) = lookup(EXPORT_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.export_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(MAX_BYTES_ENV) {
            config.max_document_bytes = raw.trim().parse().map_err(|_| {
                BookingsHelperError::invalid_input(format!("{MAX_BYTES_ENV} must be a byte count, got {raw}"))
            })?;
        }
        if let Some(raw) = lookup(ATOMIC_ENV) {
            config.atomic_import = parse_flag(&raw).ok_or_else(|| {
                BookingsHelperError::invalid_input(format!("{ATOMIC_ENV} must be true or false, got {raw}"))
            })?;
        }
        Ok(config)
    }

    pub fn with_database(mut self, database: DatabaseLocation) -> Self {
        self.database = database;
        self
    }

    pub fn with_export_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.export_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_document_bytes(mut self, max: u64) -> Self {
        self.max_document_bytes = max;
        self
    }

    pub fn with_atomic_import(mut self, atomic: bool) -> Self {
        self.atomic_import = atomic;
        self
    }

    pub fn import_options(&self, with_rules: bool) -> ImportOptions {
        ImportOptions {
            atomic: self.atomic_import,
            with_rules,
            max_document_bytes: self.max_document_bytes,
        }
    }

    pub fn open_store(&self) -> Result<BookingStore, BookingsHelperError> {
        match &self.database {
            DatabaseLocation::Memory => BookingStore::open_in_memory(),
            DatabaseLocation::Path(path) => BookingStore::open(path),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
