//! Directory ownership records.
//!
//! Each database root holds a `Database.info` and each table directory a
//! `Table.info`. Both are single-line, `|`-separated text files:
//!
//! ```text
//! Database.info   identifier|creator host|created
//! Table.info      identifier|element type|format|creator host|created
//! ```
//!
//! `created` is an RFC 3339 timestamp.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use filedb_codec::Format;
use filedb_storage::fs::write_atomic;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of a database's ownership record.
pub const DATABASE_INFO_FILE: &str = "Database.info";

/// File name of a table's ownership record.
pub const TABLE_INFO_FILE: &str = "Table.info";

const SEPARATOR: char = '|';

/// Returns the name of this host, or `"unknown"`.
#[must_use]
pub fn host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn read_line(path: &Path) -> CoreResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_created(path: &Path, field: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(field)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::invalid_info_file(path, format!("bad timestamp '{field}': {e}")))
}

fn format_created(created: &DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn split_fields<'a>(path: &Path, line: &'a str, expected: usize) -> CoreResult<Vec<&'a str>> {
    let fields: Vec<&str> = line.split(SEPARATOR).collect();
    if fields.len() != expected {
        return Err(CoreError::invalid_info_file(
            path,
            format!("expected {expected} fields, found {}", fields.len()),
        ));
    }
    Ok(fields)
}

/// Ownership record of a database directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Identifier of the owning database.
    pub identifier: String,
    /// Host that first started the database here.
    pub creator: String,
    /// When the database first started here.
    pub created: DateTime<Utc>,
}

impl DatabaseInfo {
    /// Creates a record for `identifier` created now on this host.
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            creator: host_name(),
            created: Utc::now(),
        }
    }

    /// Returns the record's path under `root`.
    #[must_use]
    pub fn path(root: &Path) -> PathBuf {
        root.join(DATABASE_INFO_FILE)
    }

    /// Reads the record under `root`, if any.
    pub fn read(root: &Path) -> CoreResult<Option<Self>> {
        let path = Self::path(root);
        let Some(line) = read_line(&path)? else {
            return Ok(None);
        };
        let fields = split_fields(&path, &line, 3)?;
        Ok(Some(Self {
            identifier: fields[0].to_string(),
            creator: fields[1].to_string(),
            created: parse_created(&path, fields[2])?,
        }))
    }

    /// Writes the record under `root`.
    pub fn write(&self, root: &Path) -> CoreResult<()> {
        let line = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.identifier,
            self.creator,
            format_created(&self.created)
        );
        write_atomic(&Self::path(root), line.as_bytes())?;
        Ok(())
    }
}

/// Ownership and format record of a table directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Identifier of the owning table.
    pub identifier: String,
    /// Type name of the stored records.
    pub element_type: String,
    /// Format of the data file.
    pub format: Format,
    /// Host that first started the table here.
    pub creator: String,
    /// When the table first started here.
    pub created: DateTime<Utc>,
}

impl TableInfo {
    /// Creates a record created now on this host.
    #[must_use]
    pub fn new(identifier: &str, element_type: &str, format: Format) -> Self {
        Self {
            identifier: identifier.to_string(),
            element_type: element_type.to_string(),
            format,
            creator: host_name(),
            created: Utc::now(),
        }
    }

    /// Returns the record's path in `dir`.
    #[must_use]
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(TABLE_INFO_FILE)
    }

    /// Reads the record in `dir`, if any.
    pub fn read(dir: &Path) -> CoreResult<Option<Self>> {
        let path = Self::path(dir);
        let Some(line) = read_line(&path)? else {
            return Ok(None);
        };
        let fields = split_fields(&path, &line, 5)?;
        let format = Format::from_name(fields[2]).map_err(|_| CoreError::UnknownFormat {
            name: fields[2].to_string(),
        })?;
        Ok(Some(Self {
            identifier: fields[0].to_string(),
            element_type: fields[1].to_string(),
            format,
            creator: fields[3].to_string(),
            created: parse_created(&path, fields[4])?,
        }))
    }

    /// Writes the record in `dir`.
    pub fn write(&self, dir: &Path) -> CoreResult<()> {
        let line = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.identifier,
            self.element_type,
            self.format.name(),
            self.creator,
            format_created(&self.created)
        );
        write_atomic(&Self::path(dir), line.as_bytes())?;
        Ok(())
    }
}
