//! Core type definitions shared across the Draftloom crates.

mod ids;
mod project;

pub use ids::ProjectId;
pub use project::{LocalProject, ProjectSnapshot, SNAPSHOT_SCHEMA_VERSION};
