use crate::model::ScanResult;
use anyhow::Result;

pub fn print_json(result: &ScanResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
