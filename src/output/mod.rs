mod cli;
mod json;
pub mod xml;

pub use cli::print_cli_table;
pub use json::print_json;
pub use xml::{manifest_bytes, write_manifest, ExportDocument};

use crate::model::ScanResult;
use anyhow::Result;

/// Output format for listing scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
    /// The manifest document, printed instead of written
    Xml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            _ => Err(format!(
                "Unknown format: {}. Use 'table', 'json', or 'xml'",
                s
            )),
        }
    }
}

pub fn print_result(result: &ScanResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(result),
        OutputFormat::Json => print_json(result),
        OutputFormat::Xml => {
            print!("{}", format_result_to_string(result, format)?);
            Ok(())
        }
    }
}

/// Format result to string for file output
pub fn format_result_to_string(result: &ScanResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Xml => Ok(String::from_utf8(manifest_bytes(&result.records)?)?),
        OutputFormat::Json | OutputFormat::Table => Ok(serde_json::to_string_pretty(result)?),
    }
}
