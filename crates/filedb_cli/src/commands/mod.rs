//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod relocate;
pub mod verify;
