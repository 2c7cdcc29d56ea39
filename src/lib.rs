//! Third-party module manifests for installed products.
//!
//! depmanifest walks a product's installation directory, collects every
//! binary module that does not belong to the product vendor, reads the
//! module's version resource and, for managed assemblies, its assembly
//! attributes, and writes the result as `Third_Party_Libs.xml`.

pub mod config;
pub mod error;
pub mod export;
pub mod metadata;
pub mod model;
pub mod output;
pub mod scanner;
pub mod shell;

pub use config::{AttributeGating, Config};
pub use error::{Error, Result};
pub use export::{Export, Exporter};
pub use model::{ModuleRecord, ScanResult, ScanStats};
pub use scanner::ModuleScanner;
