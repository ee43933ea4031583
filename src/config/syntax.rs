//! Grammar backends for the config parser.

use std::path::Path;

use hcl::eval::{Context, Evaluate};
use hcl::{Block, Body, Expression, Structure, Value};

use super::ProviderSettings;
use super::variables::{VariableDefinition, VariableScope};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Parses configuration text into a document and decodes typed structures
/// from it.
pub trait ConfigSyntax {
    type Document;

    fn parse(&self, source: &str, path: &Path) -> Result<Self::Document>;

    /// Decode `variable` declarations. No variables are in scope here.
    fn decode_variables(
        &self,
        document: &Self::Document,
        path: &Path,
    ) -> Result<Vec<VariableDefinition>>;

    /// Decode the provider configuration with `scope` exposed as `var`.
    fn decode_provider(
        &self,
        document: &Self::Document,
        scope: &VariableScope,
        path: &Path,
    ) -> Result<ProviderConfig>;
}

/// HCL backend built on `hcl-rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HclSyntax;

impl ConfigSyntax for HclSyntax {
    type Document = Body;

    fn parse(&self, source: &str, path: &Path) -> Result<Body> {
        hcl::parse(source).map_err(|e| Error::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn decode_variables(&self, body: &Body, path: &Path) -> Result<Vec<VariableDefinition>> {
        let ctx = Context::new();
        let mut definitions: Vec<VariableDefinition> = Vec::new();

        for structure in body.iter() {
            let block = match structure {
                Structure::Block(block) if block.identifier() == "variable" => block,
                other => return Err(unexpected(other, path)),
            };

            let name = single_label(block, path)?;
            if definitions.iter().any(|d| d.name == name) {
                return Err(invalid(path, format!("duplicate variable \"{name}\"")));
            }

            let mut def = VariableDefinition::new(name.clone());
            for structure in block.body().iter() {
                let attr = match structure {
                    Structure::Attribute(attr) => attr,
                    other => return Err(unexpected(other, path)),
                };
                let value = evaluate(attr.expr(), &ctx, attr.key(), path)?;

                match attr.key() {
                    "description" => def.description = string_value(value, attr.key(), path)?,
                    "value" => def.value = string_value(value, attr.key(), path)?,
                    "default" => def.default = string_value(value, attr.key(), path)?,
                    "required" => def.required = bool_value(value, attr.key(), path)?,
                    other => {
                        return Err(invalid(
                            path,
                            format!("unsupported argument '{other}' in variable \"{name}\""),
                        ));
                    }
                }
            }

            definitions.push(def);
        }

        Ok(definitions)
    }

    fn decode_provider(
        &self,
        body: &Body,
        scope: &VariableScope,
        path: &Path,
    ) -> Result<ProviderConfig> {
        let ctx = eval_context(scope);
        let mut provider = None;

        for structure in body.iter() {
            let block = match structure {
                Structure::Block(block) if block.identifier() == "provider" => block,
                other => return Err(unexpected(other, path)),
            };
            if provider.is_some() {
                return Err(invalid(path, "duplicate provider block"));
            }
            provider = Some(decode_provider_block(block, &ctx, path)?);
        }

        Ok(ProviderConfig { provider })
    }
}

fn decode_provider_block(block: &Block, ctx: &Context, path: &Path) -> Result<ProviderSettings> {
    let kind = single_label(block, path)?;
    let mut project_id = None;
    let mut region = None;

    for structure in block.body().iter() {
        let attr = match structure {
            Structure::Attribute(attr) => attr,
            other => return Err(unexpected(other, path)),
        };
        let slot = match attr.key() {
            "project_id" => &mut project_id,
            "region" => &mut region,
            other => {
                return Err(invalid(
                    path,
                    format!("unsupported argument '{other}' in provider \"{kind}\""),
                ));
            }
        };
        let value = evaluate(attr.expr(), ctx, attr.key(), path)?;
        *slot = string_value(value, attr.key(), path)?;
    }

    let required = |value: Option<String>, key: &str| {
        value.ok_or_else(|| {
            invalid(
                path,
                format!("missing required argument '{key}' in provider \"{kind}\""),
            )
        })
    };

    Ok(ProviderSettings {
        project_id: required(project_id, "project_id")?,
        region: required(region, "region")?,
        kind,
    })
}

/// Context exposing only `var.<NAME>` for each resolved binding.
fn eval_context(scope: &VariableScope) -> Context<'static> {
    let vars: hcl::Map<String, Value> = scope
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();

    let mut ctx = Context::new();
    ctx.declare_var("var", Value::Object(vars));
    ctx
}

fn evaluate(expr: &Expression, ctx: &Context, key: &str, path: &Path) -> Result<Value> {
    expr.evaluate(ctx).map_err(|e| Error::Evaluation {
        path: path.to_path_buf(),
        message: format!("{key}: {e}"),
    })
}

fn single_label(block: &Block, path: &Path) -> Result<String> {
    match block.labels() {
        [label] => Ok(label.as_str().to_string()),
        labels => Err(invalid(
            path,
            format!(
                "{} block expects exactly one label, found {}",
                block.identifier(),
                labels.len()
            ),
        )),
    }
}

/// Scalars are accepted where a string is expected; null means unset.
fn string_value(value: Value, key: &str, path: &Path) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(invalid(path, format!("'{key}' must be a string"))),
    }
}

fn bool_value(value: Value, key: &str, path: &Path) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        _ => Err(invalid(path, format!("'{key}' must be a bool"))),
    }
}

fn unexpected(structure: &Structure, path: &Path) -> Error {
    match structure {
        Structure::Attribute(attr) => {
            invalid(path, format!("unsupported argument '{}'", attr.key()))
        }
        Structure::Block(block) => invalid(
            path,
            format!("unsupported block type '{}'", block.identifier()),
        ),
    }
}

fn invalid(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}
