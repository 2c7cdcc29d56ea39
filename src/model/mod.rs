//! Core data types for scanned modules and scan results.
//!
//! - [`ModuleRecord`] - One binary module found under the scanned root
//! - [`ScanResult`] - Ordered records plus scan counters
//!
//! # Example
//!
//! ```
//! use depmanifest::{ModuleRecord, ScanResult};
//!
//! let record = ModuleRecord::with_defaults("Foo.dll");
//! let result = ScanResult::new("/opt/product", vec![record]);
//!
//! assert_eq!(result.records[0].title, "Foo");
//! ```

mod record;

pub use record::*;
