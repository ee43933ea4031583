//! biql: project scaffolding, warehouse schema extraction and provider
//! configuration parsing.
//!
//! The `biql` binary is a thin dispatcher over these modules.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod scaffold;
pub mod schema;
pub mod warehouse;

pub use error::{Error, Result};
