//! Provider configuration parsing.
//!
//! A provider file is decoded against the variables declared in a sibling
//! `variables.hcl`. Both files are re-read on every call.

mod syntax;
mod variables;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

pub use syntax::{ConfigSyntax, HclSyntax};
pub use variables::{VariableDefinition, VariableScope, resolve};

pub const DEFAULT_CONFIG_FILE: &str = "provider.hcl";
pub const VARIABLES_FILE: &str = "variables.hcl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    pub provider: Option<ProviderSettings>,
}

/// Settings from a `provider "<kind>" { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSettings {
    pub kind: String,
    pub project_id: String,
    pub region: String,
}

/// Parse an HCL provider file. An empty path means `provider.hcl` in the
/// current directory.
pub fn parse_provider(config_path: &Path) -> Result<ProviderConfig> {
    parse_provider_with(&HclSyntax, config_path)
}

pub fn parse_provider_with<S: ConfigSyntax>(
    syntax: &S,
    config_path: &Path,
) -> Result<ProviderConfig> {
    let config_path = resolve_config_path(config_path)?;
    let vars_path = variables_path(&config_path);

    let scope = load_variables(syntax, &vars_path)?;
    debug!(path = %vars_path.display(), bound = scope.len(), "resolved variables");

    let source = read_source(&config_path)?;
    let document = syntax.parse(&source, &config_path)?;
    let config = syntax.decode_provider(&document, &scope, &config_path)?;
    debug!(path = %config_path.display(), ?config, "decoded provider config");

    Ok(config)
}

/// Parse and resolve a variables file.
pub fn load_variables<S: ConfigSyntax>(syntax: &S, path: &Path) -> Result<VariableScope> {
    let source = read_source(path)?;
    let document = syntax.parse(&source, path)?;
    let definitions = syntax.decode_variables(&document, path)?;
    resolve(&definitions)
}

fn resolve_config_path(path: &Path) -> Result<PathBuf> {
    let path = if path.as_os_str().is_empty() {
        Path::new(DEFAULT_CONFIG_FILE)
    } else {
        path
    };
    std::path::absolute(path).map_err(|e| Error::io(path, e))
}

fn variables_path(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) => dir.join(VARIABLES_FILE),
        None => PathBuf::from(VARIABLES_FILE),
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}
