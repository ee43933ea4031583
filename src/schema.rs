use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::warehouse::{ColumnMetadata, FieldType, Row, TableId, Warehouse, WarehouseError};

/// Serializable description of one column, nested for RECORD columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<SchemaField>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Fetch the column schema of `identifier` (`project.dataset.table`).
///
/// The identifier is validated before the warehouse is contacted.
pub async fn extract_schema<W: Warehouse>(
    warehouse: &W,
    identifier: &str,
) -> Result<Vec<SchemaField>> {
    let table: TableId = identifier.parse()?;

    let metadata = warehouse
        .table_metadata(&table)
        .await
        .map_err(|source| remote_error(&table, source))?;
    debug!(%table, columns = metadata.columns.len(), "fetched table metadata");

    Ok(convert_columns(&metadata.columns))
}

/// Convert warehouse columns into schema fields, keeping declaration order at
/// every nesting level. Only RECORD columns carry nested fields.
pub fn convert_columns(columns: &[ColumnMetadata]) -> Vec<SchemaField> {
    columns
        .iter()
        .map(|column| SchemaField {
            name: column.name.clone(),
            field_type: column.field_type,
            description: column.description.clone().filter(|d| !d.is_empty()),
            required: column.required,
            repeated: column.repeated,
            schema: if column.field_type == FieldType::Record {
                convert_columns(&column.fields)
            } else {
                Vec::new()
            },
        })
        .collect()
}

/// Fetch at most `limit` rows from `identifier`.
///
/// A zero limit returns no rows without running a query. The row stream is
/// never polled past `limit` rows.
pub async fn fetch_sample_rows<W: Warehouse>(
    warehouse: &W,
    identifier: &str,
    limit: usize,
) -> Result<Vec<Row>> {
    let table: TableId = identifier.parse()?;
    if limit == 0 {
        return Ok(Vec::new());
    }

    let sql = sample_query(&table, limit);
    let rows = warehouse
        .query(&table.project, &sql)
        .await
        .map_err(|source| remote_error(&table, source))?
        .take(limit)
        .try_collect::<Vec<_>>()
        .await
        .map_err(|source| remote_error(&table, source))?;

    debug!(%table, rows = rows.len(), "fetched sample rows");
    Ok(rows)
}

fn sample_query(table: &TableId, limit: usize) -> String {
    format!("SELECT * FROM `{table}` LIMIT {limit}")
}

fn remote_error(table: &TableId, source: WarehouseError) -> Error {
    Error::Remote {
        table: table.to_string(),
        source,
    }
}

/// Write `fields` as 2-space indented JSON, replacing any existing file.
pub fn persist_schema(fields: &[SchemaField], path: &Path) -> Result<()> {
    let mut json = serde_json::to_string_pretty(fields)?;
    json.push('\n');
    fs::write(path, json).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), "schema saved");
    Ok(())
}

/// `<table>_schema.json` in the current directory.
pub fn default_output_path(table: &str) -> PathBuf {
    PathBuf::from(format!("{table}_schema.json"))
}

/// Render fields as a box-drawing tree rooted at `table`.
pub fn render_schema_tree(table: &str, fields: &[SchemaField]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Schema Tree ({table}):");
    out.push_str("└── root\n");
    render_fields(fields, "    ", &mut out);
    out
}

fn render_fields(fields: &[SchemaField], indent: &str, out: &mut String) {
    for (i, field) in fields.iter().enumerate() {
        let is_last = i == fields.len() - 1;
        let branch = if is_last { "└── " } else { "├── " };

        let mut flags = Vec::new();
        if field.required {
            flags.push("required");
        }
        if field.repeated {
            flags.push("repeated");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };

        let _ = writeln!(
            out,
            "{indent}{branch}{}: {}{flags}",
            field.name, field.field_type
        );

        let child_indent = format!("{indent}{}", if is_last { "    " } else { "│   " });
        render_fields(&field.schema, &child_indent, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{RowStream, TableMetadata};
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// In-memory warehouse that records how it is used.
    #[derive(Default)]
    struct FakeWarehouse {
        columns: Vec<ColumnMetadata>,
        total_rows: usize,
        calls: AtomicUsize,
        rows_read: AtomicUsize,
        last_sql: Mutex<Option<String>>,
    }

    impl Warehouse for FakeWarehouse {
        async fn table_metadata(&self, table: &TableId) -> Result<TableMetadata, WarehouseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TableMetadata {
                table: table.clone(),
                description: None,
                num_rows: Some(self.total_rows as u64),
                columns: self.columns.clone(),
            })
        }

        async fn query<'a>(
            &'a self,
            _project: &'a str,
            sql: &'a str,
        ) -> Result<RowStream<'a>, WarehouseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_sql.lock().unwrap() = Some(sql.to_string());

            let rows_read = &self.rows_read;
            let rows = stream::iter(0..self.total_rows).map(move |i| {
                rows_read.fetch_add(1, Ordering::SeqCst);
                let mut row = Row::new();
                row.insert("n".to_string(), json!(i));
                Ok(row)
            });
            Ok(rows.boxed())
        }
    }

    fn nested_columns() -> Vec<ColumnMetadata> {
        vec![
            ColumnMetadata::new("a", FieldType::String),
            ColumnMetadata::new("b", FieldType::Record).with_fields(vec![
                ColumnMetadata::new("c", FieldType::Integer),
                ColumnMetadata::new("d", FieldType::Record)
                    .with_fields(vec![ColumnMetadata::new("e", FieldType::Boolean)]),
            ]),
        ]
    }

    fn names(fields: &[SchemaField]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_convert_nested_preserves_depth_and_order() {
        let fields = convert_columns(&nested_columns());

        assert_eq!(names(&fields), ["a", "b"]);
        assert!(fields[0].schema.is_empty());
        assert_eq!(names(&fields[1].schema), ["c", "d"]);
        assert_eq!(names(&fields[1].schema[1].schema), ["e"]);
        assert_eq!(fields[1].schema[1].schema[0].field_type, FieldType::Boolean);
    }

    #[test]
    fn test_convert_ignores_children_of_scalar_columns() {
        let column = ColumnMetadata::new("s", FieldType::String)
            .with_fields(vec![ColumnMetadata::new("x", FieldType::String)]);
        let fields = convert_columns(&[column]);
        assert!(fields[0].schema.is_empty());
    }

    #[test]
    fn test_convert_copies_flags() {
        let mut column = ColumnMetadata::new("tags", FieldType::String);
        column.repeated = true;
        column.description = Some("free-form labels".to_string());
        let mut id = ColumnMetadata::new("id", FieldType::Integer);
        id.required = true;
        id.description = Some(String::new());

        let fields = convert_columns(&[column, id]);
        assert!(fields[0].repeated);
        assert_eq!(fields[0].description.as_deref(), Some("free-form labels"));
        assert!(fields[1].required);
        assert_eq!(fields[1].description, None);
    }

    #[tokio::test]
    async fn test_extract_schema() {
        let warehouse = FakeWarehouse {
            columns: nested_columns(),
            ..Default::default()
        };
        let fields = extract_schema(&warehouse, "p.d.t").await.unwrap();
        assert_eq!(fields, convert_columns(&nested_columns()));
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_identifier_never_reaches_warehouse() {
        let warehouse = FakeWarehouse::default();

        for bad in ["p.d", "p.d.t.x", "p..t", ""] {
            let err = extract_schema(&warehouse, bad).await.unwrap_err();
            assert!(matches!(err, Error::InvalidTableId { .. }));

            let err = fetch_sample_rows(&warehouse, bad, 5).await.unwrap_err();
            assert!(matches!(err, Error::InvalidTableId { .. }));
        }
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sample_rows_stop_at_limit() {
        let warehouse = FakeWarehouse {
            total_rows: 1000,
            ..Default::default()
        };

        let rows = fetch_sample_rows(&warehouse, "p.d.t", 5).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4]["n"], json!(4));
        assert_eq!(warehouse.rows_read.load(Ordering::SeqCst), 5);
        assert_eq!(
            warehouse.last_sql.lock().unwrap().as_deref(),
            Some("SELECT * FROM `p.d.t` LIMIT 5")
        );
    }

    #[tokio::test]
    async fn test_sample_rows_end_of_results() {
        let warehouse = FakeWarehouse {
            total_rows: 3,
            ..Default::default()
        };
        let rows = fetch_sample_rows(&warehouse, "p.d.t", 10).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_skips_query() {
        let warehouse = FakeWarehouse {
            total_rows: 10,
            ..Default::default()
        };
        let rows = fetch_sample_rows(&warehouse, "p.d.t", 0).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_persist_schema_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut columns = nested_columns();
        columns[0].required = true;

        persist_schema(&convert_columns(&columns), &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let expected = r#"[
  {
    "name": "a",
    "type": "STRING",
    "required": true
  },
  {
    "name": "b",
    "type": "RECORD",
    "schema": [
      {
        "name": "c",
        "type": "INTEGER"
      },
      {
        "name": "d",
        "type": "RECORD",
        "schema": [
          {
            "name": "e",
            "type": "BOOLEAN"
          }
        ]
      }
    ]
  }
]
"#;
        assert_eq!(written, expected);

        let parsed: Vec<SchemaField> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, convert_columns(&columns));
    }

    #[test]
    fn test_persist_schema_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "stale").unwrap();

        persist_schema(&[], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]\n");
    }

    #[test]
    fn test_persist_schema_returns_write_error() {
        let dir = tempdir().unwrap();
        let err = persist_schema(&[], dir.path()).unwrap_err();
        match err {
            Error::Io { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path("p.d.t"),
            PathBuf::from("p.d.t_schema.json")
        );
    }

    #[test]
    fn test_render_schema_tree() {
        let mut columns = nested_columns();
        columns[1].repeated = true;
        let tree = render_schema_tree("p.d.t", &convert_columns(&columns));

        let expected = "\
Schema Tree (p.d.t):
└── root
    ├── a: STRING
    └── b: RECORD (repeated)
        ├── c: INTEGER
        └── d: RECORD
            └── e: BOOLEAN
";
        assert_eq!(tree, expected);
    }
}
