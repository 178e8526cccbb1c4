//! yangcli schema layer
//!
//! This crate turns a directory of YANG-subset documents into the immutable
//! [`model::CommandModel`] consumed by the interactive shell:
//!
//! - [`yang`] parses one document into a generic statement tree,
//! - [`extract`] runs a single typed visitor pass over that tree,
//! - [`model`] merges the typed declarations (first occurrence wins),
//! - [`loader`] ties it together for a schema directory.

pub mod digest;
pub mod extract;
pub mod loader;
pub mod model;
pub mod yang;

pub use loader::{load_schema_dir, load_schema_sources, LoadedSchema, SchemaError};
pub use model::{ArgStyle, CommandModel, RpcCommand, StatusField};
