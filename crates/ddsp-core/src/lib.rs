//! Core types and configuration for the DDSP training runner.
//!
//! This crate provides the foundations shared by the data and training crates:
//!
//! - The error taxonomy ([`DdspError`]) and [`Result`] alias
//! - A parser for the gin binding language ([`gin`])
//! - A [`Registry`] of configurables that bindings may target
//! - Ordered layer merging into an immutable [`ResolvedConfig`]

#![warn(missing_docs)]

mod config;
mod error;
pub mod gin;
mod paths;
mod registry;

pub use config::*;
pub use error::*;
pub use gin::{BindingKey, ConfigValue, Reference};
pub use paths::expand_user;
pub use registry::{Configurable, Registry};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigBuilder, LayerOrigin, ResolvedConfig};
    pub use crate::error::{DdspError, Result};
    pub use crate::gin::{ConfigValue, Reference};
    pub use crate::registry::Registry;
}
