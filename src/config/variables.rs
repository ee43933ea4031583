use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Error, Result};

/// A `variable "NAME" { ... }` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableDefinition {
    pub name: String,
    pub description: Option<String>,
    pub value: Option<String>,
    pub default: Option<String>,
    pub required: bool,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        VariableDefinition {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Resolved variable bindings, exposed to interpolation as `var.NAME`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableScope {
    bindings: IndexMap<String, String>,
}

impl VariableScope {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for VariableScope {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        VariableScope {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// Bind each variable to its value, else its default.
///
/// Empty strings count as unset. A required variable with neither fails the
/// whole resolution; an optional one is left out of the scope.
pub fn resolve(definitions: &[VariableDefinition]) -> Result<VariableScope> {
    let mut bindings = IndexMap::new();

    for def in definitions {
        let bound = [def.value.as_deref(), def.default.as_deref()]
            .into_iter()
            .flatten()
            .find(|v| !v.is_empty());

        match bound {
            Some(value) => {
                bindings.insert(def.name.clone(), value.to_string());
            }
            None if def.required => {
                return Err(Error::MissingVariable {
                    name: def.name.clone(),
                });
            }
            None => debug!(name = %def.name, "optional variable left unbound"),
        }
    }

    Ok(VariableScope { bindings })
}
