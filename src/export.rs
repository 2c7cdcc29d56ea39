//! Scan-and-write: the operation behind both the shell's generate action
//! and the `export` subcommand.

use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::ScanResult;
use crate::output::write_manifest;
use crate::scanner::ModuleScanner;

/// A finished export.
#[derive(Debug)]
pub struct Export {
    /// Where the manifest was written.
    pub path: PathBuf,
    pub result: ScanResult,
}

impl Export {
    /// The message shown to the user once the manifest is on disk.
    pub fn success_message(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string());
        format!(
            "Third-party assemblies are successfully exported to {}",
            file_name
        )
    }
}

pub struct Exporter {
    config: Config,
    progress: ProgressBar,
}

impl Exporter {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Scans `input` and writes the manifest into `output_dir`, replacing
    /// any manifest already there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryNotFound`] before touching the output
    /// directory if `input` is not a directory, and [`Error::OutputWrite`]
    /// if the manifest cannot be written.
    pub fn export(&self, input: &Path, output_dir: &Path) -> Result<Export> {
        if !input.is_dir() {
            return Err(Error::DirectoryNotFound {
                path: input.to_path_buf(),
            });
        }

        let result = ModuleScanner::new(&self.config)
            .with_progress(self.progress.clone())
            .scan(input)?;

        let path = output_dir.join(&self.config.output_file_name);
        write_manifest(&result.records, &path)?;

        info!(
            input = %input.display(),
            output = %path.display(),
            assemblies = result.records.len(),
            "export finished"
        );
        Ok(Export { path, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixture::ImageBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn product_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let a = ImageBuilder::new()
            .with_version_strings(&[("FileVersion", "1.0"), ("CompanyName", "Acme")])
            .build();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin").join("A.dll"), &a).unwrap();
        fs::write(dir.path().join("B.exe"), ImageBuilder::new().build()).unwrap();
        fs::write(dir.path().join("JetBrains.Foo.dll"), &a).unwrap();
        dir
    }

    #[test]
    fn test_export_writes_manifest() {
        let input = product_tree();
        let output = TempDir::new().unwrap();

        let export = Exporter::new(&Config::default())
            .export(input.path(), output.path())
            .unwrap();

        assert_eq!(export.path, output.path().join("Third_Party_Libs.xml"));
        let xml = fs::read_to_string(&export.path).unwrap();
        assert_eq!(xml.matches("<Assembly ").count(), 2);
        assert!(xml.contains("<Assembly Title=\"A\" Version=\"1.0\">"));
        assert!(xml.find("A.dll").unwrap() < xml.find("B.exe").unwrap());
        assert!(!xml.contains("JetBrains"));
    }

    #[test]
    fn test_success_message_names_the_file() {
        let input = product_tree();
        let output = TempDir::new().unwrap();

        let export = Exporter::new(&Config::default())
            .export(input.path(), output.path())
            .unwrap();

        assert_eq!(
            export.success_message(),
            "Third-party assemblies are successfully exported to Third_Party_Libs.xml"
        );
    }

    #[test]
    fn test_missing_input_writes_nothing() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let missing = input.path().join("not-installed");

        let err = Exporter::new(&Config::default())
            .export(&missing, output.path())
            .unwrap_err();

        assert_eq!(err.to_string(), format!("No such directory: {}", missing.display()));
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_output_is_reported() {
        let input = product_tree();
        let output = TempDir::new().unwrap();
        let missing = output.path().join("gone");

        let err = Exporter::new(&Config::default())
            .export(input.path(), &missing)
            .unwrap_err();

        assert!(matches!(err, Error::OutputWrite { .. }));
    }

    #[test]
    fn test_repeated_export_is_byte_identical() {
        let input = product_tree();
        let output = TempDir::new().unwrap();
        let exporter = Exporter::new(&Config::default());

        let first = exporter.export(input.path(), output.path()).unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = exporter.export(input.path(), output.path()).unwrap();

        assert_eq!(first_bytes, fs::read(&second.path).unwrap());
    }

    #[test]
    fn test_configured_file_name() {
        let input = product_tree();
        let output = TempDir::new().unwrap();
        let config = Config {
            output_file_name: "libs.xml".to_string(),
            ..Config::default()
        };

        let export = Exporter::new(&config)
            .export(input.path(), output.path())
            .unwrap();

        assert!(output.path().join("libs.xml").is_file());
        assert!(export.success_message().ends_with("libs.xml"));
    }
}
