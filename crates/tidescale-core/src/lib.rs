//! tidescale-core — shared vocabulary for the tidescale autoscaler.
//!
//! Holds the domain types passed between the sampler, the engine and the
//! collaborator clients, the narrow collaborator traits the engine drives,
//! and the TOML configuration model that freezes into an [`EngineConfig`].

pub mod collaborator;
pub mod config;
pub mod error;
pub mod types;

pub use collaborator::*;
pub use config::{EngineConfig, TidescaleConfig};
pub use error::{CollabResult, CollaboratorError, ConfigError};
pub use types::*;
