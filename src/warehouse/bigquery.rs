//! BigQuery warehouse backend
//!
//! Submits each staged file as a multipart load job, polls the job until it
//! reports `DONE`, then reads the destination's row count. A job finishing
//! with an `errorResult` leaves the table untouched, which is what makes
//! `WRITE_TRUNCATE` safe to retry on the next run.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{Destination, LoadOptions, LoadReport, Warehouse};
use crate::error::{EtlError, EtlResult};
use crate::staging::StagedTable;

/// Connection settings for the BigQuery REST API
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub location: String,
    pub api_base: String,
    pub access_token: String,
    pub poll_interval: Duration,
}

/// BigQuery warehouse backend
pub struct BigQueryWarehouse {
    config: BigQueryConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResponse {
    #[serde(default)]
    num_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ErrorProto,
}

impl TableResponse {
    fn row_count(&self) -> Option<u64> {
        self.num_rows.as_deref().and_then(|n| n.parse().ok())
    }
}

impl JobStatus {
    fn is_done(&self) -> bool {
        self.state == "DONE"
    }

    /// Failure message of a finished job
    fn failure(&self) -> Option<String> {
        let primary = self.error_result.as_ref()?;
        let mut message = match &primary.reason {
            Some(reason) => format!("{}: {}", reason, primary.message),
            None => primary.message.clone(),
        };
        let details: Vec<&str> = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .filter(|m| *m != primary.message)
            .collect();
        if !details.is_empty() {
            message.push_str(&format!(" ({})", details.join("; ")));
        }
        Some(message)
    }
}

impl BigQueryWarehouse {
    pub fn new(config: BigQueryConfig) -> EtlResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EtlError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Fully qualified table id, `project.dataset.table`
    pub fn table_ref(&self, table: &str) -> String {
        format!(
            "{}.{}.{}",
            self.config.project_id, self.config.dataset_id, table
        )
    }

    /// Load job resource for a destination
    fn job_body(
        &self,
        job_id: &str,
        destination: &Destination,
        options: &LoadOptions,
    ) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = destination
            .columns
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "type": c.data_type.bigquery_type(),
                    "mode": "NULLABLE",
                })
            })
            .collect();

        json!({
            "jobReference": {
                "projectId": self.config.project_id,
                "jobId": job_id,
                "location": self.config.location,
            },
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.config.project_id,
                        "datasetId": self.config.dataset_id,
                        "tableId": destination.table,
                    },
                    "sourceFormat": options.source_format,
                    "skipLeadingRows": options.skip_leading_rows,
                    "writeDisposition": options.write_disposition.as_str(),
                    "createDisposition": "CREATE_IF_NEEDED",
                    "allowQuotedNewlines": options.allow_quoted_newlines,
                    "encoding": options.encoding,
                    "schema": { "fields": fields },
                }
            }
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.config.project_id)
        )
    }

    fn job_url(&self, job_id: &str, location: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/jobs/{}?location={}",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.config.project_id),
            urlencoding::encode(job_id),
            urlencoding::encode(location)
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.config.project_id),
            urlencoding::encode(&self.config.dataset_id),
            urlencoding::encode(table)
        )
    }

    /// Read a response body, turning HTTP failures into rejections
    async fn read_json<T: serde::de::DeserializeOwned>(
        table: &str,
        response: reqwest::Response,
    ) -> EtlResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EtlError::load_rejected(table, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EtlError::load_rejected(
                table,
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| EtlError::load_rejected(table, format!("Unexpected response: {}", e)))
    }

    async fn submit(
        &self,
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> EtlResult<JobResponse> {
        let table = destination.table.as_str();
        let data = tokio::fs::read(&staged.path)
            .await
            .map_err(|e| EtlError::load_rejected(table, format!("Unreadable file: {}", e)))?;

        let job_id = format!("etl_{}_{}", table, uuid::Uuid::new_v4().simple());
        let metadata = self.job_body(&job_id, destination, options);
        let boundary = format!("etl_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, &data);

        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(&self.config.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| EtlError::load_rejected(table, format!("Job submission failed: {}", e)))?;

        Self::read_json(table, response).await
    }

    async fn wait_for(&self, table: &str, mut job: JobResponse) -> EtlResult<String> {
        let location = job
            .job_reference
            .location
            .clone()
            .unwrap_or_else(|| self.config.location.clone());

        while !job.status.is_done() {
            tracing::debug!(
                table,
                job_id = %job.job_reference.job_id,
                state = %job.status.state,
                "Waiting for load job"
            );
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(self.job_url(&job.job_reference.job_id, &location))
                .bearer_auth(&self.config.access_token)
                .send()
                .await
                .map_err(|e| EtlError::load_rejected(table, format!("Job poll failed: {}", e)))?;
            job = Self::read_json(table, response).await?;
        }

        if let Some(message) = job.status.failure() {
            return Err(EtlError::load_rejected(table, message));
        }
        Ok(job.job_reference.job_id)
    }

    /// Row count reported for the destination table, if any
    async fn row_count(&self, table: &str) -> EtlResult<Option<u64>> {
        let response = self
            .client
            .get(self.table_url(table))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| EtlError::load_rejected(table, format!("Table lookup failed: {}", e)))?;
        let resource: TableResponse = Self::read_json(table, response).await?;
        Ok(resource.row_count())
    }
}

/// Body of a `multipart/related` upload: JSON metadata then the file
fn multipart_related(boundary: &str, metadata: &serde_json::Value, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 1024);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait(?Send)]
impl Warehouse for BigQueryWarehouse {
    async fn load_table(
        &self,
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> EtlResult<LoadReport> {
        let table = destination.table.as_str();
        let job = self.submit(staged, destination, options).await?;
        let job_id = self.wait_for(table, job).await?;
        let rows_loaded = match self.row_count(table).await? {
            Some(rows) => rows,
            None => {
                tracing::warn!(
                    table,
                    job_id = %job_id,
                    staged = staged.row_count,
                    "Table resource has no row count; reporting the staged row count"
                );
                staged.row_count as u64
            }
        };

        tracing::info!(
            table = %self.table_ref(table),
            job_id = %job_id,
            rows = rows_loaded,
            "Load job completed"
        );
        Ok(LoadReport {
            table: table.to_string(),
            rows_loaded,
            job_id: Some(job_id),
        })
    }

    fn backend_type(&self) -> &'static str {
        "bigquery"
    }
}
