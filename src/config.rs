//! Configuration file handling.
//!
//! This module provides loading and saving of depmanifest settings from a
//! TOML file. The file only holds user-authored settings; nothing about a
//! run (such as the last chosen directory) is ever written back.
//!
//! # Configuration Location
//!
//! - Linux: `~/.config/depmanifest/config.toml`
//! - macOS: `~/Library/Application Support/depmanifest/config.toml`
//! - Windows: `%APPDATA%\depmanifest\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! exclude_substring = "JetBrains"
//! module_suffixes = [".dll", ".exe"]
//! output_file_name = "Third_Party_Libs.xml"
//! attribute_gating = "own"
//! follow_links = false
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Which attribute decides whether a descriptor field overwrites the
/// version-resource value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeGating {
    /// Every field is gated on its own attribute.
    #[default]
    Own,
    /// Version, copyright, description, and product are gated on the
    /// company attribute, and reading stops at the first of them that is
    /// missing while the company attribute is present.
    Company,
}

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use depmanifest::Config;
///
/// let config = Config::load().unwrap();
/// println!("Excluding modules mentioning {:?}", config.exclude_substring);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Modules whose filename, title, or copyright contains this literal
    /// are left out of the manifest. Matching is case-sensitive.
    ///
    /// Default: "JetBrains"
    pub exclude_substring: String,

    /// Filename suffixes that mark a file as a binary module.
    /// Matching is case-sensitive.
    ///
    /// Default: [".dll", ".exe"]
    pub module_suffixes: Vec<String>,

    /// Name of the manifest written into the output directory.
    ///
    /// Default: "Third_Party_Libs.xml"
    pub output_file_name: String,

    /// How descriptor attributes override version-resource fields.
    ///
    /// Default: "own"
    pub attribute_gating: AttributeGating,

    /// Whether the directory walk follows symbolic links.
    ///
    /// Default: false
    pub follow_links: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exclude_substring: "JetBrains".to_string(),
            module_suffixes: vec![".dll".to_string(), ".exe".to_string()],
            output_file_name: "Third_Party_Libs.xml".to_string(),
            attribute_gating: AttributeGating::Own,
            follow_links: false,
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Saves the configuration to the config file, creating the parent
    /// directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::Config {
                    message: format!("failed to create {}: {}", parent.display(), e),
                })?;
            }
        }

        let content = self.to_toml()?;
        fs::write(&path, content).map_err(|e| Error::Config {
            message: format!("failed to write {}: {}", path.display(), e),
        })?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depmanifest")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        Config::default().to_toml().unwrap_or_default()
    }

    /// Renders these settings in the config file format.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    /// Returns true if `file_name` ends with one of the module suffixes.
    pub fn is_module_name(&self, file_name: &str) -> bool {
        self.module_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }

    /// Returns true if `text` contains the exclusion substring.
    ///
    /// An empty exclusion substring excludes nothing.
    pub fn is_excluded(&self, text: &str) -> bool {
        !self.exclude_substring.is_empty() && text.contains(&self.exclude_substring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.exclude_substring, "JetBrains");
        assert_eq!(config.module_suffixes, vec![".dll", ".exe"]);
        assert_eq!(config.output_file_name, "Third_Party_Libs.xml");
        assert_eq!(config.attribute_gating, AttributeGating::Own);
        assert!(!config.follow_links);
    }

    #[test]
    fn test_to_toml_reflects_overrides() {
        let mut config = Config::default();
        config.exclude_substring = "Contoso".to_string();
        let text = config.to_toml().unwrap();

        assert!(text.contains("exclude_substring = \"Contoso\""));
        assert_eq!(Config::from_toml(&text).unwrap().exclude_substring, "Contoso");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("attribute_gating = \"company\"\n").unwrap();

        assert_eq!(config.attribute_gating, AttributeGating::Company);
        assert_eq!(config.exclude_substring, "JetBrains");
        assert_eq!(config.module_suffixes.len(), 2);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("attribute_gating = \"sometimes\"").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = Config::generate_default_config();
        let config = Config::from_toml(&text).unwrap();
        assert_eq!(config.output_file_name, "Third_Party_Libs.xml");
    }

    #[test]
    fn test_module_suffix_is_case_sensitive() {
        let config = Config::default();

        assert!(config.is_module_name("Foo.dll"));
        assert!(config.is_module_name("Setup.exe"));
        assert!(!config.is_module_name("FOO.DLL"));
        assert!(!config.is_module_name("Foo.dll.config"));
        assert!(!config.is_module_name("readme.txt"));
    }

    #[test]
    fn test_exclusion_is_literal_and_case_sensitive() {
        let config = Config::default();

        assert!(config.is_excluded("JetBrains.Annotations.dll"));
        assert!(!config.is_excluded("jetbrains.annotations.dll"));
        assert!(!config.is_excluded("Jet*"));

        let config = Config {
            exclude_substring: String::new(),
            ..Config::default()
        };
        assert!(!config.is_excluded("anything"));
    }
}
