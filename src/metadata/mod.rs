//! Best-effort metadata extraction from binary modules.
//!
//! Extraction happens in two passes:
//!
//! 1. [`MetadataExtractor::read_version_resource`] reads the PE version
//!    resource. It never fails; anything it cannot read stays `"Unknown"`.
//! 2. [`MetadataExtractor::apply_descriptor`] reads the assembly attributes
//!    of a managed module and overwrites the first-pass fields. It fails for
//!    native modules and malformed metadata, and callers are expected to
//!    keep the record as it stands when it does.
//!
//! [`MetadataExtractor::extract`] runs both passes over a single read of the
//! file. Both passes only read bytes. Module code is never loaded or run.
//!
//! # Example
//!
//! ```no_run
//! use depmanifest::config::AttributeGating;
//! use depmanifest::metadata::MetadataExtractor;
//! use std::path::Path;
//!
//! let extractor = MetadataExtractor::new(AttributeGating::Own);
//! let path = Path::new("/opt/product/bin/Foo.dll");
//!
//! let mut record = extractor.read_version_resource(path);
//! if extractor.apply_descriptor(path, &mut record).is_err() {
//!     // not a managed assembly, keep the version-resource values
//! }
//! println!("{} {}", record.title, record.version);
//! ```

mod clr;
mod pe;
mod version_info;

#[cfg(test)]
pub(crate) mod fixture;

pub use clr::{read_assembly_descriptor, AssemblyDescriptor, DescriptorField};
pub use pe::PeImage;
pub use version_info::{parse_version_info, read_version_strings, StringTable, VersionStrings};

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::config::AttributeGating;
use crate::model::ModuleRecord;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read module: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a PE image: {0}")]
    Pe(#[from] goblin::error::Error),

    #[error("truncated data: {0}")]
    Read(#[from] scroll::Error),

    #[error("RVA {rva:#x} is outside every section")]
    OutOfBounds { rva: u32 },

    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error("unsupported metadata table {0:#04x}")]
    UnsupportedTable(u8),

    #[error("module has no CLI header")]
    NotManaged,

    #[error("module has no assembly manifest")]
    NotAnAssembly,

    #[error("{} is missing", .0.attribute_name())]
    MissingAttribute(DescriptorField),
}

impl MetadataError {
    pub(crate) fn malformed(message: &str) -> Self {
        MetadataError::Malformed(message.to_string())
    }
}

/// Fields in the order the descriptor pass overwrites them.
const OVERWRITE_ORDER: [DescriptorField; 6] = [
    DescriptorField::Title,
    DescriptorField::Company,
    DescriptorField::Version,
    DescriptorField::Copyright,
    DescriptorField::Description,
    DescriptorField::Product,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor {
    gating: AttributeGating,
}

impl MetadataExtractor {
    pub fn new(gating: AttributeGating) -> Self {
        Self { gating }
    }

    /// Runs both passes over a single read of `path`.
    ///
    /// The record is always returned. The second element reports why the
    /// descriptor pass did not complete, if it did not; the record then
    /// holds whatever was assigned before the failure.
    pub fn extract(&self, path: &Path) -> (ModuleRecord, Result<(), MetadataError>) {
        let mut record = ModuleRecord::with_defaults(file_name_of(path));
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => return (record, Err(err.into())),
        };
        let image = match PeImage::parse(&bytes) {
            Ok(image) => image,
            Err(err) => return (record, Err(err)),
        };

        self.fill_version_fields(path, &image, &mut record);
        let outcome = read_assembly_descriptor(&image)
            .and_then(|descriptor| self.overwrite(&descriptor, &mut record));
        (record, outcome)
    }

    /// First pass: builds a record from the module's version resource.
    ///
    /// Unreadable files, non-PE files, and modules without a version
    /// resource all yield the defaults of [`ModuleRecord::with_defaults`].
    pub fn read_version_resource(&self, path: &Path) -> ModuleRecord {
        let mut record = ModuleRecord::with_defaults(file_name_of(path));
        let outcome = fs::read(path).map_err(MetadataError::from).and_then(|bytes| {
            let image = PeImage::parse(&bytes)?;
            self.fill_version_fields(path, &image, &mut record);
            Ok(())
        });
        if let Err(err) = outcome {
            debug!(path = %path.display(), error = %err, "no version resource");
        }
        record
    }

    /// Second pass: overwrites record fields with the module's assembly
    /// attributes.
    ///
    /// A present attribute always wins, even when its value is empty. On
    /// error the record keeps every field assigned before the failure.
    pub fn apply_descriptor(&self, path: &Path, record: &mut ModuleRecord) -> Result<(), MetadataError> {
        let bytes = fs::read(path)?;
        let image = PeImage::parse(&bytes)?;
        let descriptor = read_assembly_descriptor(&image)?;
        self.overwrite(&descriptor, record)
    }

    fn fill_version_fields(&self, path: &Path, image: &PeImage<'_>, record: &mut ModuleRecord) {
        let strings = match read_version_strings(image) {
            Ok(Some(strings)) => strings,
            Ok(None) => return,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "unreadable version resource");
                return;
            }
        };

        let fields: [(&str, &mut String); 5] = [
            ("FileVersion", &mut record.version),
            ("CompanyName", &mut record.company),
            ("LegalCopyright", &mut record.copyright),
            ("FileDescription", &mut record.description),
            ("ProductName", &mut record.product),
        ];
        for (key, field) in fields {
            if let Some(value) = strings.get(key) {
                *field = value.to_string();
            }
        }
    }

    fn overwrite(&self, descriptor: &AssemblyDescriptor, record: &mut ModuleRecord) -> Result<(), MetadataError> {
        let company_present = descriptor.company.is_some();

        for field in OVERWRITE_ORDER {
            let value = descriptor.get(field);
            let gate_open = match (self.gating, field) {
                (AttributeGating::Own, _)
                | (AttributeGating::Company, DescriptorField::Title | DescriptorField::Company) => {
                    value.is_some()
                }
                (AttributeGating::Company, _) => company_present,
            };
            if !gate_open {
                continue;
            }

            let value = value.ok_or(MetadataError::MissingAttribute(field))?;
            *record_field(record, field) = value.to_string();
        }
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn record_field(record: &mut ModuleRecord, field: DescriptorField) -> &mut String {
    match field {
        DescriptorField::Title => &mut record.title,
        DescriptorField::Company => &mut record.company,
        DescriptorField::Version => &mut record.version,
        DescriptorField::Copyright => &mut record.copyright,
        DescriptorField::Description => &mut record.description,
        DescriptorField::Product => &mut record.product,
    }
}
