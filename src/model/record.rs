use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder for any metadata field the module does not carry.
pub const UNKNOWN: &str = "Unknown";

/// Metadata for one distinct module filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub title: String,
    pub version: String,
    pub description: String,
    pub file_name: String,
    pub company: String,
    pub copyright: String,
    pub product: String,
}

impl ModuleRecord {
    /// A record with every field set to [`UNKNOWN`] except the filename and
    /// the title, which defaults to the filename without its extension.
    pub fn with_defaults(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let title = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());

        Self {
            title,
            version: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
            file_name,
            company: UNKNOWN.to_string(),
            copyright: UNKNOWN.to_string(),
            product: UNKNOWN.to_string(),
        }
    }

    /// Returns true if the filename, title, or copyright contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.file_name.contains(needle)
            || self.title.contains(needle)
            || self.copyright.contains(needle)
    }
}

/// Counters collected while scanning, used for logging and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files carrying a module suffix.
    pub candidates: usize,
    /// Files dropped before extraction because their name matched the exclusion.
    pub excluded_by_name: usize,
    /// Later paths dropped because an earlier one had the same filename.
    pub duplicates: usize,
    /// Records dropped after extraction because their metadata matched the exclusion.
    pub excluded_by_metadata: usize,
    /// Modules whose descriptor attributes could not be read.
    pub descriptor_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: PathBuf,
    pub scan_time: DateTime<Utc>,
    pub records: Vec<ModuleRecord>,
    #[serde(default)]
    pub stats: ScanStats,
}

impl ScanResult {
    pub fn new(root: impl Into<PathBuf>, records: Vec<ModuleRecord>) -> Self {
        Self {
            root: root.into(),
            scan_time: Utc::now(),
            records,
            stats: ScanStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: ScanStats) -> Self {
        self.stats = stats;
        self
    }
}
