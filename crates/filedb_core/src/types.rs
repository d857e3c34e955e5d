//! Core type definitions for FileDB.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{self, TypeId};
use std::fmt;

/// A value that can be stored in a table or page.
///
/// Implemented for every serde type that can cross threads.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Runtime description of a table's or page's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    id: TypeId,
    name: &'static str,
}

impl ElementType {
    /// Describes `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: any::type_name::<T>(),
        }
    }

    /// Returns the Rust type name, as recorded in info files.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns whether this describes `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Characters that cannot appear in an identifier.
///
/// Identifiers become directory names and `|` separates info file fields.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Checks that `identifier` can name a database, table or page.
pub fn validate_identifier(identifier: &str) -> CoreResult<()> {
    if identifier.trim().is_empty() {
        return Err(CoreError::invalid_identifier(identifier, "must not be blank"));
    }
    if identifier == "." || identifier == ".." {
        return Err(CoreError::invalid_identifier(
            identifier,
            "must not be a relative path component",
        ));
    }
    if identifier.trim() != identifier {
        return Err(CoreError::invalid_identifier(
            identifier,
            "must not start or end with whitespace",
        ));
    }
    if identifier
        .chars()
        .any(|c| c.is_control() || FORBIDDEN.contains(&c))
    {
        return Err(CoreError::invalid_identifier(
            identifier,
            "contains a character that is not allowed in file names",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_identity() {
        let ty = ElementType::of::<String>();
        assert!(ty.is::<String>());
        assert!(!ty.is::<u32>());
        assert_eq!(ty.name(), "alloc::string::String");
    }

    #[test]
    fn valid_identifiers() {
        for id in ["orders", "Orders 2024", "line-items", "a.b", "ünïcode"] {
            validate_identifier(id).unwrap();
        }
    }

    #[test]
    fn invalid_identifiers() {
        for id in ["", "  ", ".", "..", "a/b", "a\\b", "a|b", " padded", "tab\t"] {
            assert!(
                matches!(
                    validate_identifier(id),
                    Err(CoreError::InvalidIdentifier { .. })
                ),
                "{id:?} should be rejected"
            );
        }
    }
}
