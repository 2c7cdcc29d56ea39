//! Directory scanning for binary modules.
//!
//! [`ModuleScanner`] walks an installation directory, keeps one path per
//! module filename, extracts metadata for each, and drops anything that
//! belongs to the excluded vendor.
//!
//! # Example
//!
//! ```no_run
//! use depmanifest::{Config, ModuleScanner};
//! use std::path::Path;
//!
//! let config = Config::default();
//! let result = ModuleScanner::new(&config).scan(Path::new("/opt/product"))?;
//!
//! for record in &result.records {
//!     println!("{} {}", record.file_name, record.version);
//! }
//! # Ok::<(), depmanifest::Error>(())
//! ```

use indicatif::ProgressBar;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::MetadataExtractor;
use crate::model::{ScanResult, ScanStats};

/// A module filename as a map key.
///
/// Keys sort alphabetically without regard to case. Names that differ only
/// in case remain distinct keys, with the lowercase spelling first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleKey {
    folded: String,
    name: String,
}

impl ModuleKey {
    pub fn new(file_name: impl Into<String>) -> Self {
        let name = file_name.into();
        Self {
            folded: name.to_lowercase(),
            name,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }
}

impl Ord for ModuleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded
            .cmp(&other.folded)
            .then_with(|| other.name.cmp(&self.name))
    }
}

impl PartialOrd for ModuleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Module paths keyed by filename, in filename order.
pub type ModuleIndex = BTreeMap<ModuleKey, PathBuf>;

pub struct ModuleScanner {
    config: Config,
    extractor: MetadataExtractor,
    progress: ProgressBar,
}

impl ModuleScanner {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            extractor: MetadataExtractor::new(config.attribute_gating),
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports per-module progress on `progress` while scanning.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Finds module files under `root`, dropping excluded names and later
    /// duplicates of a filename.
    ///
    /// Each directory's files are visited before its subdirectories, so a
    /// module closer to the root wins over a same-named one further down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryNotFound`] if `root` is not a directory.
    pub fn collect_modules(&self, root: &Path) -> Result<(ModuleIndex, ScanStats)> {
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut modules = ModuleIndex::new();
        let mut stats = ScanStats::default();

        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_links)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            if !self.config.is_module_name(&file_name) {
                continue;
            }
            stats.candidates += 1;

            if self.config.is_excluded(&file_name) {
                stats.excluded_by_name += 1;
                continue;
            }

            match modules.entry(ModuleKey::new(file_name)) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.into_path());
                }
                Entry::Occupied(kept) => {
                    debug!(
                        kept = %kept.get().display(),
                        dropped = %entry.path().display(),
                        "duplicate module filename"
                    );
                    stats.duplicates += 1;
                }
            }
        }

        Ok((modules, stats))
    }

    /// Scans `root` and returns the surviving records in filename order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryNotFound`] if `root` is not a directory.
    /// Metadata failures never surface; the affected records keep their
    /// version-resource values.
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        let (modules, mut stats) = self.collect_modules(root)?;
        self.progress.set_length(modules.len() as u64);

        let mut records = Vec::with_capacity(modules.len());
        for (key, path) in &modules {
            self.progress.set_message(key.file_name().to_string());

            let (record, descriptor) = self.extractor.extract(path);
            if let Err(err) = descriptor {
                debug!(path = %path.display(), error = %err, "descriptor attributes unavailable");
                stats.descriptor_failures += 1;
            }
            self.progress.inc(1);

            if !self.config.exclude_substring.is_empty()
                && record.mentions(&self.config.exclude_substring)
            {
                debug!(module = %key.file_name(), "excluded by metadata");
                stats.excluded_by_metadata += 1;
                continue;
            }
            records.push(record);
        }

        info!(
            root = %root.display(),
            modules = records.len(),
            duplicates = stats.duplicates,
            excluded = stats.excluded_by_name + stats.excluded_by_metadata,
            "scan finished"
        );

        Ok(ScanResult::new(root, records).with_stats(stats))
    }
}
