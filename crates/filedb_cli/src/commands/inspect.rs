//! Inspect command implementation.

use filedb_core::{DatabaseInspector, TableInfo};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Owning database identifier.
    pub identifier: String,
    /// Host that created the database.
    pub creator: String,
    /// Creation time, RFC 3339.
    pub created: String,
    /// Tables found in the directory.
    pub tables: Vec<TableSummary>,
    /// Records of the requested table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<serde_json::Value>>,
}

/// Metadata of a single table.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    /// Table identifier.
    pub identifier: String,
    /// Type name of the stored records.
    pub element_type: String,
    /// Data file format.
    pub format: String,
    /// Host that created the table.
    pub creator: String,
    /// Creation time, RFC 3339.
    pub created: String,
}

impl From<TableInfo> for TableSummary {
    fn from(info: TableInfo) -> Self {
        Self {
            identifier: info.identifier,
            element_type: info.element_type,
            format: info.format.name().to_string(),
            creator: info.creator,
            created: info.created.to_rfc3339(),
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, table: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let inspector = DatabaseInspector::new(path);
    let info = inspector.info()?;

    let result = InspectResult {
        path: path.display().to_string(),
        identifier: info.identifier,
        creator: info.creator,
        created: info.created.to_rfc3339(),
        tables: inspector
            .tables()?
            .into_iter()
            .map(TableSummary::from)
            .collect(),
        records: table.map(|t| inspector.records(t)).transpose()?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result, table);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult, table: Option<&str>) {
    println!("FileDB Database Inspection");
    println!("==========================");
    println!();
    println!("Path:       {}", result.path);
    println!("Identifier: {}", result.identifier);
    println!("Created:    {} on {}", result.created, result.creator);
    println!();
    println!("Tables ({}):", result.tables.len());
    for t in &result.tables {
        println!("  {} [{}] {}", t.identifier, t.format, t.element_type);
    }

    if let (Some(table), Some(records)) = (table, &result.records) {
        println!();
        println!("Records of {table} ({}):", records.len());
        for record in records {
            println!("  {record}");
        }
    }
}
