//! reqwest implementation of the backend contract

use super::{
    classify, decode, CaseBackend, HealthStatus, Operation, RequestError, SearchRequest,
    SearchResponse,
};
use crate::model::{BackupEntry, Case, CaseFilter, Statistics, SubmitReceipt};
use crate::render::{image_url, PLACEHOLDER_IMAGE};
use crate::upload::{mime_for_file_name, ImageUpload, ValidatedCase, ValidationError};
use crate::ClientConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// HTTP backend for the FindThem REST API
pub struct HttpBackend {
    client: Client,
    api_base: String,
    origin: String,
    uploads_base: String,
    endpoints: crate::Endpoints,
    timeout: Duration,
    last_cache_buster: AtomicU64,
}

#[derive(Deserialize)]
struct CasesPayload {
    cases: Vec<Case>,
}

#[derive(Deserialize)]
struct CasePayload {
    case: Case,
}

#[derive(Deserialize)]
struct StatisticsPayload {
    statistics: Statistics,
}

#[derive(Deserialize)]
struct LoginPayload {
    #[serde(default)]
    authenticated: bool,
}

#[derive(Deserialize)]
struct BackupPayload {
    backup_file: String,
}

#[derive(Deserialize)]
struct BackupsPayload {
    backups: Vec<BackupEntry>,
}

#[derive(Deserialize)]
struct MessagePayload {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct HealthPayload {
    status: String,
    #[serde(default)]
    database: Option<String>,
}

impl HttpBackend {
    /// Create a backend from the client configuration
    pub fn new(config: &ClientConfig) -> Result<Self, RequestError> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base().to_string(),
            origin: config.origin().to_string(),
            uploads_base: config.uploads_base(),
            endpoints: config.endpoints.clone(),
            timeout,
            last_cache_buster: AtomicU64::new(0),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn case_url(&self, template: &str, case_id: i64) -> String {
        self.url(&template.replace("{id}", &case_id.to_string()))
    }

    /// Strictly increasing per client: epoch millis, bumped past the last value
    fn cache_buster(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last_cache_buster.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_cache_buster.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> RequestError {
        if err.is_timeout() {
            RequestError::Timeout(self.timeout)
        } else {
            RequestError::Connection(err.to_string())
        }
    }

    /// Send a request and classify the outcome
    async fn execute(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<serde_json::Value, RequestError> {
        let start = Instant::now();
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        debug!(
            operation = %operation,
            status,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Backend responded"
        );

        classify(operation, status, &body)
    }

    fn image_part(&self, image: &ImageUpload) -> Result<Part, RequestError> {
        Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| RequestError::Connection(format!("Invalid image MIME type: {}", e)))
    }
}

#[async_trait]
impl CaseBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.api_base
    }

    async fn submit_case(&self, case: &ValidatedCase) -> Result<SubmitReceipt, RequestError> {
        let form = Form::new()
            .text("name", case.name.clone())
            .text("status", case.status.as_str())
            .text("description", case.description.clone())
            .text("contact", case.contact.clone())
            .part("image", self.image_part(&case.photo)?);

        let request = self.client.post(self.url(&self.endpoints.upload_case)).multipart(form);
        decode(self.execute(Operation::SubmitCase, request).await?)
    }

    async fn search_face(&self, request: SearchRequest) -> Result<SearchResponse, RequestError> {
        let mut form = Form::new().part("image", self.image_part(&request.image)?);
        if let Some(threshold) = request.min_similarity {
            form = form.text("min_similarity", threshold.to_string());
        }

        let request = self.client.post(self.url(&self.endpoints.search_face)).multipart(form);
        decode(self.execute(Operation::Search, request).await?)
    }

    async fn list_cases(&self, filter: CaseFilter) -> Result<Vec<Case>, RequestError> {
        let mut query = vec![("t", self.cache_buster().to_string())];
        if let Some(status) = filter.status() {
            query.push(("status", status.as_str().to_string()));
        }

        let request = self.client.get(self.url(&self.endpoints.cases)).query(&query);
        let payload: CasesPayload = decode(self.execute(Operation::ListCases, request).await?)?;
        Ok(payload.cases)
    }

    async fn case_detail(&self, case_id: i64) -> Result<Case, RequestError> {
        let request = self
            .client
            .get(self.case_url(&self.endpoints.case_detail, case_id))
            .query(&[("t", self.cache_buster())]);
        let payload: CasePayload = decode(self.execute(Operation::CaseDetail, request).await?)?;
        Ok(payload.case)
    }

    async fn statistics(&self) -> Result<Statistics, RequestError> {
        let request = self
            .client
            .get(self.url(&self.endpoints.statistics))
            .query(&[("t", self.cache_buster())]);
        let payload: StatisticsPayload = decode(self.execute(Operation::Statistics, request).await?)?;
        Ok(payload.statistics)
    }

    async fn fetch_image(&self, image_path: &str) -> Result<ImageUpload, RequestError> {
        let url = image_url(&self.uploads_base, Some(image_path));
        if url == PLACEHOLDER_IMAGE {
            return Err(ValidationError::required("photo").into());
        }
        let response = self.client.get(&url).send().await.map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Failed to fetch case image");
            return Err(RequestError::Rejected(
                Operation::FetchImage.fallback_message().to_string(),
            ));
        }

        let file_name = image_path
            .replace('\\', "/")
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("image")
            .to_string();
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| mime_for_file_name(&file_name).to_string());
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;

        Ok(ImageUpload::new(file_name, mime_type, bytes.to_vec()))
    }

    async fn login(&self, password: &str) -> Result<bool, RequestError> {
        let request = self
            .client
            .post(self.url(&self.endpoints.login))
            .multipart(Form::new().text("password", password.to_string()));

        match self.execute(Operation::Login, request).await {
            Ok(payload) => Ok(decode::<LoginPayload>(payload)?.authenticated),
            // The backend reports a wrong password as `success: false`
            Err(RequestError::Rejected(message)) => {
                debug!(message = %message, "Login rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_case(&self, case_id: i64, admin_password: &str) -> Result<(), RequestError> {
        let request = self
            .client
            .post(self.case_url(&self.endpoints.delete_case, case_id))
            .multipart(Form::new().text("admin_password", admin_password.to_string()));
        self.execute(Operation::DeleteCase, request).await?;
        Ok(())
    }

    async fn create_backup(&self, admin_password: &str) -> Result<String, RequestError> {
        let request = self
            .client
            .post(self.url(&self.endpoints.backup))
            .multipart(Form::new().text("admin_password", admin_password.to_string()));
        let payload: BackupPayload = decode(self.execute(Operation::CreateBackup, request).await?)?;
        Ok(payload.backup_file)
    }

    async fn list_backups(&self, admin_password: &str) -> Result<Vec<BackupEntry>, RequestError> {
        let request = self
            .client
            .get(self.url(&self.endpoints.backups))
            .query(&[("admin_password", admin_password)]);
        let payload: BackupsPayload = decode(self.execute(Operation::ListBackups, request).await?)?;
        Ok(payload.backups)
    }

    async fn restore_backup(
        &self,
        backup_filename: &str,
        admin_password: &str,
    ) -> Result<String, RequestError> {
        let form = Form::new()
            .text("backup_filename", backup_filename.to_string())
            .text("admin_password", admin_password.to_string());
        let request = self.client.post(self.url(&self.endpoints.restore)).multipart(form);
        let payload: MessagePayload = decode(self.execute(Operation::RestoreBackup, request).await?)?;
        Ok(payload.message)
    }

    async fn health_check(&self) -> HealthStatus {
        let url = format!("{}/health", self.origin);
        let start = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                if !response.status().is_success() {
                    return HealthStatus {
                        healthy: false,
                        latency_ms: Some(latency),
                        database: None,
                        error: Some(format!("HTTP {}", response.status())),
                    };
                }
                match response.json::<HealthPayload>().await {
                    Ok(health) => HealthStatus {
                        healthy: health.status == "healthy",
                        latency_ms: Some(latency),
                        database: health.database,
                        error: None,
                    },
                    Err(e) => HealthStatus {
                        healthy: false,
                        latency_ms: Some(latency),
                        database: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => HealthStatus {
                healthy: false,
                latency_ms: None,
                database: None,
                error: Some(e.to_string()),
            },
        }
    }
}
