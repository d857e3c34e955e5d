//! Relocate command implementation.

use filedb_core::{relocate_tree, RelocateOptions};
use std::path::Path;
use tracing::info;

/// Copies the database directory to `to`, removing the old one unless
/// `keep_old` is set.
pub fn run(
    from: &Path,
    to: &Path,
    overwrite: bool,
    keep_old: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Relocating {:?} to {:?}", from, to);

    let options = RelocateOptions::new()
        .overwrite(overwrite)
        .keep_old_source(keep_old);
    let copied = relocate_tree(from, to, options)?;

    println!("✓ Relocated database");
    println!("  From: {}", from.display());
    println!("  To: {}", to.display());
    println!("  Files: {copied}");
    if keep_old {
        println!("  Old directory kept");
    }
    Ok(())
}
