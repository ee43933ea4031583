use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::config::parse_provider;
use crate::output::{OutputFormat, render_rows};
use crate::scaffold::initialize;
use crate::schema::{
    default_output_path, extract_schema, fetch_sample_rows, persist_schema, render_schema_tree,
};
use crate::warehouse::{BigQuery, TableId, Warehouse};

/// Handle init command - write the project skeleton under `dir`
pub fn handle_init_command(dir: &Path) -> Result<()> {
    let report = initialize(dir).context("Error initializing project")?;

    for path in &report.directories {
        println!("Created directory: {}", path.display());
    }
    for path in &report.created {
        println!("Created file: {}", path.display());
    }
    for path in &report.skipped {
        println!("File already exists, skipping: {}", path.display());
    }

    println!("Initialized in directory: {}", dir.display());
    println!("Edit dev/variables.hcl to set your GCP project ID.");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub table: String,
    pub output: Option<PathBuf>,
    pub samples: usize,
    pub format: OutputFormat,
    pub truncate: usize,
    pub timeout: Option<Duration>,
    pub access_token: Option<String>,
    pub endpoint: String,
}

/// Handle extract command - save a table schema and optionally show sample rows
pub async fn handle_extract_command(opts: &ExtractOptions) -> Result<()> {
    // Validate before looking for credentials.
    let table: TableId = opts.table.parse()?;

    with_deadline(opts, async {
        let warehouse = BigQuery::connect(&opts.endpoint, opts.access_token.clone())
            .await
            .with_context(|| {
                format!("failed to create BigQuery client for project {}", table.project)
            })?;
        extract_with(&warehouse, opts).await
    })
    .await
}

/// [`extract_with`] bounded by `opts.timeout`.
pub async fn extract_with_deadline<W: Warehouse>(
    warehouse: &W,
    opts: &ExtractOptions,
) -> Result<()> {
    with_deadline(opts, extract_with(warehouse, opts)).await
}

async fn with_deadline(
    opts: &ExtractOptions,
    work: impl Future<Output = Result<()>>,
) -> Result<()> {
    match opts.timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
            anyhow!(
                "extracting {} timed out after {}s",
                opts.table,
                limit.as_secs()
            )
        })?,
        None => work.await,
    }
}

/// Run `work` until it finishes or `interrupt` fires. An interrupt source
/// that fails to install is ignored.
pub async fn interruptible(
    work: impl Future<Output = Result<()>>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> Result<()> {
    tokio::select! {
        result = work => result,
        Ok(()) = interrupt => Err(anyhow!("interrupted")),
    }
}

/// Extraction against any warehouse implementation.
pub async fn extract_with<W: Warehouse>(warehouse: &W, opts: &ExtractOptions) -> Result<()> {
    let fields = extract_schema(warehouse, &opts.table)
        .await
        .context("Error extracting schema")?;

    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&opts.table));
    persist_schema(&fields, &output).context("Error saving schema")?;

    print!("{}", render_schema_tree(&opts.table, &fields));
    println!("Schema saved to {}", output.display());

    if opts.samples > 0 {
        let rows = fetch_sample_rows(warehouse, &opts.table, opts.samples)
            .await
            .context("Error fetching sample data")?;
        println!("Fetched {} sample rows", rows.len());
        print!("{}", render_rows(&rows, opts.format, opts.truncate)?);
    }

    Ok(())
}

/// Handle parse command - decode a provider file and print its settings
pub fn handle_parse_command(config: &Path, json: bool) -> Result<()> {
    if !json {
        println!("Parsing provider configuration from: {}", config.display());
    }
    let parsed = parse_provider(config).context("Error parsing provider")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }

    println!("Successfully parsed provider configuration:");
    match &parsed.provider {
        Some(provider) => {
            println!("  Provider: {}", provider.kind);
            println!("  Project ID: {}", provider.project_id);
            println!("  Region: {}", provider.region);
        }
        None => println!("  Warning: Provider configuration is empty"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;
    use crate::warehouse::{
        ColumnMetadata, FieldType, Row, RowStream, TableMetadata, WarehouseError,
    };
    use futures::{StreamExt, future, stream};
    use serde_json::json;
    use tempfile::tempdir;

    struct StaticWarehouse;

    impl Warehouse for StaticWarehouse {
        async fn table_metadata(&self, table: &TableId) -> Result<TableMetadata, WarehouseError> {
            Ok(TableMetadata {
                table: table.clone(),
                description: None,
                num_rows: Some(2),
                columns: vec![
                    ColumnMetadata::new("id", FieldType::Integer),
                    ColumnMetadata::new("name", FieldType::String),
                ],
            })
        }

        async fn query<'a>(
            &'a self,
            _project: &'a str,
            _sql: &'a str,
        ) -> Result<RowStream<'a>, WarehouseError> {
            let rows = (0..2).map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), json!(i));
                row.insert("name".to_string(), json!(format!("n{i}")));
                Ok(row)
            });
            Ok(stream::iter(rows).boxed())
        }
    }

    struct StalledWarehouse;

    impl Warehouse for StalledWarehouse {
        async fn table_metadata(&self, _table: &TableId) -> Result<TableMetadata, WarehouseError> {
            future::pending().await
        }

        async fn query<'a>(
            &'a self,
            _project: &'a str,
            _sql: &'a str,
        ) -> Result<RowStream<'a>, WarehouseError> {
            future::pending().await
        }
    }

    fn options(table: &str, output: PathBuf) -> ExtractOptions {
        ExtractOptions {
            table: table.to_string(),
            output: Some(output),
            samples: 2,
            format: OutputFormat::Ndjson,
            truncate: 0,
            timeout: None,
            access_token: None,
            endpoint: String::new(),
        }
    }

    #[tokio::test]
    async fn test_extract_writes_schema_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.json");

        extract_with(&StaticWarehouse, &options("p.d.t", output.clone()))
            .await
            .unwrap();

        let written: Vec<SchemaField> =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let names: Vec<&str> = written.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
    }

    #[tokio::test]
    async fn test_extract_rejects_bad_table_before_connecting() {
        let dir = tempdir().unwrap();
        let opts = options("not-a-table", dir.path().join("schema.json"));

        let err = handle_extract_command(&opts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::Error>(),
            Some(crate::Error::InvalidTableId { .. })
        ));
        assert!(!dir.path().join("schema.json").exists());
    }

    #[test]
    fn test_init_then_parse_generated_config() {
        let dir = tempdir().unwrap();
        handle_init_command(dir.path()).unwrap();

        let parsed = parse_provider(&dir.path().join("dev/provider.hcl")).unwrap();
        let provider = parsed.provider.unwrap();
        assert_eq!(provider.kind, "bigquery");
        assert_eq!(provider.project_id, "my-gcp-project-id");
        assert_eq!(provider.region, "us-central1");

        handle_parse_command(&dir.path().join("dev/provider.hcl"), true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_deadline_stops_stalled_warehouse() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.json");
        let mut opts = options("p.d.t", output.clone());
        opts.timeout = Some(Duration::from_secs(5));

        let err = extract_with_deadline(&StalledWarehouse, &opts)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "extracting p.d.t timed out after 5s");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_extract_without_deadline_completes() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("schema.json");

        extract_with_deadline(&StaticWarehouse, &options("p.d.t", output.clone()))
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_work() {
        let err = interruptible(future::pending(), future::ready(Ok(())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
    }

    #[tokio::test]
    async fn test_failed_interrupt_handler_is_ignored() {
        let handler_error = std::io::Error::other("no signal support");
        let result = interruptible(future::ready(Ok(())), future::ready(Err(handler_error))).await;
        assert!(result.is_ok());
    }
}
