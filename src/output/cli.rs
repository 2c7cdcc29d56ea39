use crate::model::{ScanResult, UNKNOWN};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Company")]
    company: String,
    #[tabled(rename = "Product")]
    product: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    println!();
    println!(
        "Scanned {} at {}",
        result.root.display(),
        result.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if result.records.is_empty() {
        println!("No third-party modules found.");
    } else {
        println!("Found {} third-party modules:", result.records.len());
        println!();

        let rows: Vec<ModuleRow> = result
            .records
            .iter()
            .map(|r| ModuleRow {
                file: truncate(&r.file_name, 40),
                title: truncate(&r.title, 40),
                version: format_field(&r.version),
                company: truncate(&format_field(&r.company), 30),
                product: truncate(&format_field(&r.product), 30),
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    println!();
    print_summary(result);

    Ok(())
}

fn format_field(value: &str) -> String {
    if value == UNKNOWN || value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn print_summary(result: &ScanResult) {
    let stats = &result.stats;
    let unknown_versions = result
        .records
        .iter()
        .filter(|r| r.version == UNKNOWN)
        .count();

    println!("Summary:");
    if unknown_versions > 0 {
        println!(
            "  Modules: {} ({} with unknown version)",
            result.records.len(),
            unknown_versions
        );
    } else {
        println!("  Modules: {}", result.records.len());
    }
    if stats.duplicates > 0 {
        println!("  Duplicate filenames skipped: {}", stats.duplicates);
    }
    let excluded = stats.excluded_by_name + stats.excluded_by_metadata;
    if excluded > 0 {
        println!(
            "  Excluded: {} ({} by name, {} by metadata)",
            excluded, stats.excluded_by_name, stats.excluded_by_metadata
        );
    }
    if stats.descriptor_failures > 0 {
        println!(
            "  Without assembly attributes: {}",
            stats.descriptor_failures
        );
    }
}
