//! Verify command implementation.

use filedb_core::{DatabaseInspector, TableReport};
use std::path::Path;

/// Runs the verify command.
///
/// Fails if any table's data file is missing or corrupt.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", path);
    println!();

    let inspector = DatabaseInspector::new(path);
    let info = inspector.info()?;
    println!("Database: {}", info.identifier);

    let reports = inspector.verify()?;
    for report in &reports {
        print_report(report);
    }

    let failed = reports.iter().filter(|r| !r.status.is_valid()).count();
    println!();
    if failed == 0 {
        println!("✓ All {} tables verified", reports.len());
        Ok(())
    } else {
        println!("✗ {failed} of {} tables failed verification", reports.len());
        println!("  Run `filedb restore --table <id>` to restore from a backup");
        Err(format!("{failed} tables failed verification").into())
    }
}

fn print_report(report: &TableReport) {
    let marker = if report.status.is_valid() { "✓" } else { "✗" };
    println!(
        "  {marker} {} [{}]: {}, {} backups",
        report.info.identifier,
        report.info.format,
        report.status,
        report.backups
    );
}
