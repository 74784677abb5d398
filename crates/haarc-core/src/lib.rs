//! haarc core - shared types, collaborator traits, and error handling

pub mod collaborators;
pub mod error;
pub mod types;

pub use collaborators::*;
pub use error::{Error, Result};
pub use types::*;
