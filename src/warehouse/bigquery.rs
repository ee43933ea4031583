//! BigQuery REST (v2) implementation of [`Warehouse`].

use std::collections::VecDeque;

use futures::{StreamExt, stream};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value, json};
use tokio::process::Command;
use tracing::debug;

use super::{
    ColumnMetadata, FieldType, Row, RowStream, TableId, TableMetadata, Warehouse, WarehouseError,
};

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Client for the BigQuery REST API authenticated with an OAuth access token.
#[derive(Clone)]
pub struct BigQuery {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl BigQuery {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        BigQuery {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Build a client, falling back to ambient credentials when no token is
    /// given: `GOOGLE_OAUTH_ACCESS_TOKEN`, then `gcloud auth print-access-token`.
    pub async fn connect(
        endpoint: &str,
        access_token: Option<String>,
    ) -> Result<Self, WarehouseError> {
        let token = match access_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => discover_token().await?,
        };
        Ok(BigQuery::new(endpoint, token))
    }

    fn table_url(&self, table: &TableId) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.endpoint, table.project, table.dataset, table.table
        )
    }

    fn queries_url(&self, project: &str) -> String {
        format!("{}/projects/{}/queries", self.endpoint, project)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, WarehouseError> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        Err(WarehouseError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn next_page(&self, pager: &Pager) -> Result<QueryResponse, WarehouseError> {
        let job = pager.job.as_ref().ok_or_else(|| {
            WarehouseError::Decode("query response without a job reference".into())
        })?;

        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(location) = job.location.as_deref() {
            params.push(("location", location));
        }
        if let Some(token) = pager.page_token.as_deref() {
            params.push(("pageToken", token));
        }

        let url = format!("{}/{}", self.queries_url(&job.project_id), job.job_id);
        debug!(job = %job.job_id, "fetching query results page");
        self.send(self.http.get(url).query(&params)).await
    }
}

impl Warehouse for BigQuery {
    async fn table_metadata(&self, table: &TableId) -> Result<TableMetadata, WarehouseError> {
        debug!(%table, "fetching table metadata");
        let resource: TableResource = self.send(self.http.get(self.table_url(table))).await?;

        let columns = resource
            .schema
            .map(|s| s.fields)
            .unwrap_or_default()
            .into_iter()
            .map(ColumnMetadata::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableMetadata {
            table: table.clone(),
            description: resource.description.filter(|d| !d.is_empty()),
            num_rows: resource.num_rows.and_then(|n| n.parse().ok()),
            columns,
        })
    }

    async fn query<'a>(
        &'a self,
        project: &'a str,
        sql: &'a str,
    ) -> Result<RowStream<'a>, WarehouseError> {
        debug!(project, sql, "running query");
        let body = json!({ "query": sql, "useLegacySql": false });
        let first: QueryResponse = self
            .send(self.http.post(self.queries_url(project)).json(&body))
            .await?;

        let mut pager = Pager::default();
        pager.absorb(first)?;

        let rows = stream::try_unfold(pager, move |mut pager| async move {
            loop {
                if let Some(row) = pager.buffer.pop_front() {
                    return Ok::<_, WarehouseError>(Some((row, pager)));
                }
                if !pager.has_more() {
                    return Ok(None);
                }
                let page = self.next_page(&pager).await?;
                pager.absorb(page)?;
            }
        });

        Ok(rows.boxed())
    }
}

/// Paging state for one query's results.
#[derive(Default)]
struct Pager {
    job: Option<JobReference>,
    schema: Vec<TableFieldSchema>,
    buffer: VecDeque<Row>,
    page_token: Option<String>,
    complete: bool,
}

impl Pager {
    fn absorb(&mut self, page: QueryResponse) -> Result<(), WarehouseError> {
        if let Some(schema) = page.schema {
            self.schema = schema.fields;
        }
        if page.job_reference.is_some() {
            self.job = page.job_reference;
        }
        self.complete = page.job_complete;
        self.page_token = page.page_token;

        for raw in &page.rows {
            self.buffer.push_back(decode_row(&self.schema, raw)?);
        }
        Ok(())
    }

    fn has_more(&self) -> bool {
        !self.complete || self.page_token.is_some()
    }
}

async fn discover_token() -> Result<String, WarehouseError> {
    if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| WarehouseError::Credentials(format!("failed to run gcloud: {e}")))?;

    if !output.status.success() {
        return Err(WarehouseError::Credentials(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(WarehouseError::Credentials(
            "gcloud returned an empty access token".into(),
        ));
    }
    Ok(token)
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    description: Option<String>,
    num_rows: Option<String>,
    schema: Option<TableSchema>,
}

#[derive(Deserialize, Default)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Deserialize, Debug, Clone)]
struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    description: Option<String>,
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    fn mode_is(&self, mode: &str) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(mode))
    }
}

impl TryFrom<TableFieldSchema> for ColumnMetadata {
    type Error = WarehouseError;

    fn try_from(field: TableFieldSchema) -> Result<Self, Self::Error> {
        let field_type = field.field_type.parse()?;
        let required = field.mode_is("REQUIRED");
        let repeated = field.mode_is("REPEATED");
        let fields = field
            .fields
            .into_iter()
            .map(ColumnMetadata::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ColumnMetadata {
            name: field.name,
            field_type,
            description: field.description.filter(|d| !d.is_empty()),
            required,
            repeated,
            fields,
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    page_token: Option<String>,
}

/// Decode a row in the `{"f": [{"v": ...}]}` wire format.
fn decode_row(fields: &[TableFieldSchema], raw: &Value) -> Result<Row, WarehouseError> {
    let cells = raw
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::Decode("row without 'f' cells".into()))?;

    if cells.len() != fields.len() {
        return Err(WarehouseError::Decode(format!(
            "row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    fields
        .iter()
        .zip(cells)
        .map(|(field, cell)| {
            let value = cell.get("v").unwrap_or(&Value::Null);
            Ok((field.name.clone(), decode_cell(field, value)?))
        })
        .collect()
}

fn decode_cell(field: &TableFieldSchema, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if field.mode_is("REPEATED") {
        let items = value.as_array().ok_or_else(|| {
            WarehouseError::Decode(format!("repeated field '{}' is not an array", field.name))
        })?;
        return items
            .iter()
            .map(|item| decode_value(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    decode_value(field, value)
}

fn decode_value(field: &TableFieldSchema, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let text = value.as_str();
    let decoded = match field.field_type.parse::<FieldType>()? {
        FieldType::Record => Value::Object(decode_row(&field.fields, value)?),
        FieldType::Integer => text
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
        FieldType::Float => text
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        FieldType::Boolean => match text {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    };
    Ok(decoded)
}
