//! # Services
//!
//! Collaborator seams the engine consumes but does not own.

pub mod org_directory;

pub use org_directory::{OrgDirectory, OrgUser, StaticOrgDirectory};
