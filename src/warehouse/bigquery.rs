//! BigQuery warehouse over the v2 REST API
//!
//! Queries go through `jobs.query` (polling `getQueryResults` until the job
//! completes), schemas through `tables.get`, and loads through a multipart
//! `jobs.insert` upload of newline-delimited JSON.

use super::{Dialect, LoadDisposition, QueryResult, Warehouse};
use crate::auth::AuthConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::sanitize::SanitizedDataset;
use crate::schema::{SchemaField, TableSchema};
use crate::types::JsonValue;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default REST endpoint
pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Default media upload endpoint
pub const DEFAULT_UPLOAD_BASE: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

/// Connection settings for a BigQuery dataset
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// GCP project that owns the dataset and runs the jobs
    pub project: String,
    /// Dataset tables are resolved in
    pub dataset: String,
    /// REST endpoint
    pub api_base: String,
    /// Media upload endpoint
    pub upload_base: String,
    /// Job location (e.g. `US`, `EU`)
    pub location: Option<String>,
    /// Delay between job status polls
    pub poll_interval: Duration,
    /// Give up waiting on a job after this long
    pub job_timeout: Duration,
    /// HTTP settings
    pub http: HttpClientConfig,
}

impl BigQueryConfig {
    /// Config with default endpoints
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            location: None,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
            http: HttpClientConfig::default(),
        }
    }

    /// Point both endpoints at another host (emulators, tests)
    #[must_use]
    pub fn with_endpoint(mut self, root: &str) -> Self {
        let root = root.trim_end_matches('/');
        self.api_base = format!("{root}/bigquery/v2");
        self.upload_base = format!("{root}/upload/bigquery/v2");
        self
    }
}

/// BigQuery-backed warehouse
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    config: BigQueryConfig,
    client: Arc<HttpClient>,
}

impl BigQueryWarehouse {
    /// Create a warehouse client
    pub fn new(config: BigQueryConfig, auth: AuthConfig) -> Result<Self> {
        let client = HttpClient::with_auth(config.http.clone(), auth)?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    /// Same project and credentials, another dataset
    #[must_use]
    pub fn with_dataset(&self, dataset: impl Into<String>) -> Self {
        let mut config = self.config.clone();
        config.dataset = dataset.into();
        Self {
            config,
            client: Arc::clone(&self.client),
        }
    }

    /// Project id
    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.project
        )
    }

    fn with_location(&self, req: RequestConfig) -> RequestConfig {
        match &self.config.location {
            Some(location) => req.query("location", location.as_str()),
            None => req,
        }
    }

    /// Fetch the remaining pages of a completed query, or wait for it first
    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<String>,
    ) -> Result<QueryResponse> {
        let mut req = self.with_location(RequestConfig::new());
        if let Some(location) = &job.location {
            req = req.query("location", location.as_str());
        }
        if let Some(token) = page_token {
            req = req.query("pageToken", token);
        }
        self.client
            .request_json(
                Method::GET,
                &self.api_url(&format!("queries/{}", job.job_id)),
                req,
            )
            .await
    }

    /// Poll a job until it reaches `DONE`
    async fn wait_for_job(&self, mut job: Job) -> Result<Job> {
        let started = Instant::now();
        loop {
            if let Some(error) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) {
                return Err(Error::warehouse(format!(
                    "Job {} failed: {}",
                    job.job_reference.job_id, error.message
                )));
            }
            if job.is_done() {
                return Ok(job);
            }
            if started.elapsed() > self.config.job_timeout {
                return Err(Error::Timeout {
                    timeout_ms: self.config.job_timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;

            let mut req = RequestConfig::new();
            if let Some(location) = &job.job_reference.location {
                req = req.query("location", location.as_str());
            }
            job = self
                .client
                .request_json(
                    Method::GET,
                    &self.api_url(&format!("jobs/{}", job.job_reference.job_id)),
                    req,
                )
                .await?;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    fn dataset(&self) -> &str {
        &self.config.dataset
    }

    fn qualified_table(&self, table: &str) -> String {
        Dialect::BigQuery.quote_ident(&format!(
            "{}.{}.{table}",
            self.config.project, self.config.dataset
        ))
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let url = self.api_url(&format!(
            "datasets/{}/tables/{table}",
            self.config.dataset
        ));

        match self
            .client
            .request_json::<TableResource>(Method::GET, &url, RequestConfig::new())
            .await
        {
            Ok(resource) => Ok(TableSchema::new(
                resource
                    .schema
                    .map(|s| s.fields)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| SchemaField::new(f.name, f.field_type))
                    .collect(),
            )),
            Err(Error::HttpStatus { status: 404, .. }) => {
                debug!(%table, "table not found");
                Ok(TableSchema::absent())
            }
            Err(e) => Err(Error::schema_fetch(table, e.to_string())),
        }
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing query: {}", sql);

        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
        });
        if let Some(location) = &self.config.location {
            body["location"] = json!(location);
        }

        let mut response: QueryResponse = self
            .client
            .request_json(Method::POST, &self.api_url("queries"), RequestConfig::new().json(body))
            .await?;

        let started = Instant::now();
        while !response.job_complete {
            if started.elapsed() > self.config.job_timeout {
                return Err(Error::Timeout {
                    timeout_ms: self.config.job_timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| Error::warehouse("Incomplete query returned no job reference"))?;
            response = self.query_results(&job, None).await?;
        }

        if let Some(error) = response.errors.first() {
            return Err(Error::warehouse(format!("Query failed: {}", error.message)));
        }

        let fields = response.schema.take().map(|s| s.fields).unwrap_or_default();
        let mut result = QueryResult {
            columns: fields.iter().map(|f| f.name.clone()).collect(),
            rows: Vec::new(),
        };
        append_rows(&mut result, &fields, std::mem::take(&mut response.rows));

        while let Some(token) = response.page_token.take() {
            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| Error::warehouse("Paged query returned no job reference"))?;
            response = self.query_results(&job, Some(token)).await?;
            append_rows(&mut result, &fields, std::mem::take(&mut response.rows));
        }

        Ok(result)
    }

    async fn load(
        &self,
        table: &str,
        data: &SanitizedDataset,
        disposition: LoadDisposition,
    ) -> Result<u64> {
        let exists = !self.get_schema(table).await?.is_absent();

        let mut load = json!({
            "destinationTable": {
                "projectId": self.config.project,
                "datasetId": self.config.dataset,
                "tableId": table,
            },
            "sourceFormat": "NEWLINE_DELIMITED_JSON",
            "createDisposition": "CREATE_IF_NEEDED",
            "writeDisposition": match disposition {
                LoadDisposition::Append => "WRITE_APPEND",
                LoadDisposition::Replace => "WRITE_TRUNCATE",
            },
        });
        if !exists {
            let fields: Vec<JsonValue> = data
                .columns
                .iter()
                .map(|c| json!({"name": c, "type": "STRING", "mode": "NULLABLE"}))
                .collect();
            load["schema"] = json!({ "fields": fields });
        }

        let mut metadata = json!({ "configuration": { "load": load } });
        if let Some(location) = &self.config.location {
            metadata["jobReference"] = json!({ "location": location });
        }

        let mut ndjson = Vec::new();
        for row in data.to_json_rows() {
            serde_json::to_writer(&mut ndjson, &row)?;
            ndjson.push(b'\n');
        }

        let boundary = format!("sentiment_sync_{:016x}", rand::random::<u64>());
        let body = multipart_related(&boundary, &metadata, &ndjson)?;

        let url = format!(
            "{}/projects/{}/jobs",
            self.config.upload_base.trim_end_matches('/'),
            self.config.project
        );
        let job: Job = self
            .client
            .request_json(
                Method::POST,
                &url,
                RequestConfig::new()
                    .query("uploadType", "multipart")
                    .raw(format!("multipart/related; boundary={boundary}"), body),
            )
            .await?;

        let job = self.wait_for_job(job).await?;
        info!(
            table = %self.qualified_table(table),
            job_id = %job.job_reference.job_id,
            rows = data.len(),
            "load job finished"
        );

        Ok(data.len() as u64)
    }

    async fn call_procedure(&self, name: &str, args: &[String]) -> Result<()> {
        let routine = self.qualified_table(name);
        let args: Vec<String> = args
            .iter()
            .map(|a| Dialect::BigQuery.quote_literal(a))
            .collect();
        self.execute(&format!("CALL {routine}({})", args.join(", ")))
            .await?;
        Ok(())
    }
}

/// Encode a `multipart/related` body: JSON metadata then the media part
fn multipart_related(boundary: &str, metadata: &JsonValue, media: &[u8]) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    serde_json::to_writer(&mut body, metadata)?;
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}

fn append_rows(result: &mut QueryResult, fields: &[FieldSchema], rows: Vec<Row>) {
    for row in rows {
        let values = row
            .f
            .into_iter()
            .zip(fields)
            .map(|(cell, field)| convert_cell(cell.v, &field.field_type))
            .collect();
        result.rows.push(values);
    }
}

/// BigQuery returns every scalar as a string; restore the JSON type
fn convert_cell(value: JsonValue, field_type: &str) -> JsonValue {
    let JsonValue::String(s) = &value else {
        return value;
    };
    match field_type {
        "INTEGER" | "INT64" => s.parse::<i64>().map(JsonValue::from).unwrap_or(value),
        "FLOAT" | "FLOAT64" => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(value, JsonValue::Number),
        "BOOLEAN" | "BOOL" => match s.as_str() {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => value,
        },
        _ => value,
    }
}

// ============================================================================
// REST resources
// ============================================================================

#[derive(Debug, Deserialize)]
struct TableResource {
    #[serde(default)]
    schema: Option<SchemaResource>,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaResource {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<SchemaResource>,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
}

impl Job {
    fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn warehouse() -> BigQueryWarehouse {
        BigQueryWarehouse::new(BigQueryConfig::new("proj", "analytics"), AuthConfig::None).unwrap()
    }

    #[test]
    fn test_qualified_names() {
        let wh = warehouse();
        assert_eq!(wh.qualified_table("scores"), "`proj.analytics.scores`");
        assert_eq!(wh.dataset(), "analytics");

        let source = wh.with_dataset("raw");
        assert_eq!(source.qualified_table("surveys"), "`proj.raw.surveys`");
        assert_eq!(source.project(), "proj");
    }

    #[test]
    fn test_with_endpoint() {
        let config = BigQueryConfig::new("p", "d").with_endpoint("http://127.0.0.1:9050/");
        assert_eq!(config.api_base, "http://127.0.0.1:9050/bigquery/v2");
        assert_eq!(config.upload_base, "http://127.0.0.1:9050/upload/bigquery/v2");
    }

    #[test]
    fn test_multipart_related_layout() {
        let body = multipart_related("b", &json!({"k": 1}), b"{\"id\":\"1\"}\n").unwrap();
        let text = String::from_utf8(body).unwrap();

        assert_eq!(
            text,
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"k\":1}\r\n\
             --b\r\nContent-Type: application/octet-stream\r\n\r\n{\"id\":\"1\"}\n\r\n--b--\r\n"
        );
    }

    #[test]
    fn test_convert_cell() {
        assert_eq!(convert_cell(json!("42"), "INTEGER"), json!(42));
        assert_eq!(convert_cell(json!("1.5"), "FLOAT64"), json!(1.5));
        assert_eq!(convert_cell(json!("true"), "BOOLEAN"), json!(true));
        assert_eq!(convert_cell(json!("42"), "STRING"), json!("42"));
        assert_eq!(convert_cell(JsonValue::Null, "INTEGER"), JsonValue::Null);
        assert_eq!(convert_cell(json!("x"), "INT64"), json!("x"));
    }

    #[test]
    fn test_job_is_done() {
        let job: Job = serde_json::from_value(json!({
            "jobReference": {"jobId": "j1", "location": "US"},
            "status": {"state": "DONE"}
        }))
        .unwrap();
        assert!(job.is_done());
        assert_eq!(job.job_reference.location.as_deref(), Some("US"));

        let pending: Job =
            serde_json::from_value(json!({"jobReference": {"jobId": "j2"}})).unwrap();
        assert!(!pending.is_done());
    }
}
