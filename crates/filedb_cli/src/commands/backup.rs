//! Backup listing and restore commands.

use filedb_core::{BackupChoice, DatabaseInspector};
use std::path::Path;
use tracing::info;

/// Lists the backups of a table, most recent first.
pub fn list(db_path: &Path, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let inspector = DatabaseInspector::new(db_path);
    let backups = inspector.backups(table)?;

    if backups.is_empty() {
        println!("Table {table} has no backups");
        return Ok(());
    }

    println!("Backups of {table} ({}):", backups.len());
    for (index, backup) in backups.iter().enumerate() {
        println!(
            "  [{index}] {}  {} bytes  {}",
            backup.created().to_rfc3339(),
            backup.size()?,
            backup.path().display()
        );
    }
    Ok(())
}

/// Restores a table from one of its backups.
pub fn restore(
    db_path: &Path,
    table: &str,
    choice: BackupChoice,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring table {} in {:?}", table, db_path);

    let inspector = DatabaseInspector::new(db_path);
    let backup = inspector.restore(table, choice)?;
    let report = inspector.verify_table(table)?;

    println!("✓ Restored {table}");
    println!("  From: {}", backup.path().display());
    println!("  Taken: {}", backup.created().to_rfc3339());
    println!("  Status: {}", report.status);
    Ok(())
}
