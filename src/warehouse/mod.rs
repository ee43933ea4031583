//! Warehouse access behind a small capability trait.
//!
//! Schema extraction only needs two things from a warehouse: the column
//! metadata of a table and a stream of rows for a query. `BigQuery` provides
//! both over the REST API; tests substitute in-memory fakes.

mod bigquery;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

pub use bigquery::{BigQuery, DEFAULT_ENDPOINT};

/// One result row, column name to value, in result column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Lazily fetched query results.
pub type RowStream<'a> = BoxStream<'a, Result<Row, WarehouseError>>;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("no credentials available: {0}")]
    Credentials(String),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub trait Warehouse {
    /// Fetch column metadata for a table.
    fn table_metadata(
        &self,
        table: &TableId,
    ) -> impl Future<Output = Result<TableMetadata, WarehouseError>>;

    /// Run `sql` billed to `project` and stream the resulting rows.
    fn query<'a>(
        &'a self,
        project: &'a str,
        sql: &'a str,
    ) -> impl Future<Output = Result<RowStream<'a>, WarehouseError>>;
}

/// A fully qualified `project.dataset.table` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl FromStr for TableId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(TableId {
                    project: project.to_string(),
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(Error::InvalidTableId {
                identifier: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Column type tags as reported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Bytes,
    #[serde(alias = "INT64")]
    Integer,
    #[serde(alias = "FLOAT64")]
    Float,
    #[serde(alias = "DECIMAL")]
    Numeric,
    #[serde(alias = "BIGDECIMAL")]
    BigNumeric,
    #[serde(alias = "BOOL")]
    Boolean,
    Timestamp,
    Date,
    Time,
    DateTime,
    Geography,
    Interval,
    Json,
    Range,
    #[serde(alias = "STRUCT")]
    Record,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Numeric => "NUMERIC",
            FieldType::BigNumeric => "BIGNUMERIC",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Interval => "INTERVAL",
            FieldType::Json => "JSON",
            FieldType::Range => "RANGE",
            FieldType::Record => "RECORD",
        }
    }
}

impl FromStr for FieldType {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field_type = match s.to_ascii_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "NUMERIC" | "DECIMAL" => FieldType::Numeric,
            "BIGNUMERIC" | "BIGDECIMAL" => FieldType::BigNumeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::DateTime,
            "GEOGRAPHY" => FieldType::Geography,
            "INTERVAL" => FieldType::Interval,
            "JSON" => FieldType::Json,
            "RANGE" => FieldType::Range,
            "RECORD" | "STRUCT" => FieldType::Record,
            other => {
                return Err(WarehouseError::Decode(format!(
                    "unknown field type '{other}'"
                )));
            }
        };
        Ok(field_type)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column description as read from the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub repeated: bool,
    pub fields: Vec<ColumnMetadata>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        ColumnMetadata {
            name: name.into(),
            field_type,
            description: None,
            required: false,
            repeated: false,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<ColumnMetadata>) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table: TableId,
    pub description: Option<String>,
    pub num_rows: Option<u64>,
    pub columns: Vec<ColumnMetadata>,
}
