use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{ChatMessage, Patient, PatientId},
    error::ApiErrorBody,
    protocol::{
        ChatReply, ChatRequest, CreatePatientRequest, CreatePatientResponse, ImportResponse,
        ImportTrainingToStoreRequest, ImportTrainingToStoreResponse, PatientExport,
        PatientRecord, RenameTrainingPatientRequest, RenameTrainingPatientResponse,
        TrainingSummary,
    },
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub mod controller;
pub mod downloads;
pub mod import_preview;
pub mod state;
pub mod symptoms;
pub mod ticker;
pub mod view;

pub use controller::{
    ConfirmPrompt, ControllerEvent, DiagnosticianController, Snapshot, CLEAR_CHAT_QUESTION,
};
pub use downloads::{DirectoryDownloads, DownloadSink};
pub use ticker::DurationTicker;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiClientError {
    /// The server answered with an error payload or a non-success status.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// The request never completed (connect failure, timeout, reset).
    #[error("{0}")]
    Transport(String),
    #[error("unexpected response from server: {0}")]
    Decode(String),
}

impl ApiClientError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiClientError>;

/// Remote operations the controller depends on.
#[async_trait]
pub trait DiagnosticianApi: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> ApiResult<ChatReply>;
    async fn list_patients(&self) -> ApiResult<Vec<Patient>>;
    async fn patient(&self, id: &PatientId) -> ApiResult<Patient>;
    async fn create_patient(&self, request: &CreatePatientRequest)
        -> ApiResult<CreatePatientResponse>;
    async fn chat_history(&self, id: &PatientId) -> ApiResult<Vec<ChatMessage>>;
    async fn export_patient(&self, id: &PatientId) -> ApiResult<PatientExport>;
    async fn training_summary(&self) -> ApiResult<TrainingSummary>;
    async fn training_patients(&self, limit: usize) -> ApiResult<Vec<Patient>>;
    async fn training_patient(&self, id: &PatientId) -> ApiResult<Patient>;
    async fn import_training_json(&self, filename: &str, contents: Vec<u8>)
        -> ApiResult<ImportResponse>;
    async fn import_training_to_store(&self, limit: usize)
        -> ApiResult<ImportTrainingToStoreResponse>;
    async fn rename_training_patient(
        &self,
        request: &RenameTrainingPatientRequest,
    ) -> ApiResult<RenameTrainingPatientResponse>;
}

/// reqwest-backed client for the diagnostician HTTP/JSON API.
pub struct HttpDiagnosticianApi {
    http: Client,
    base_url: Url,
}

impl HttpDiagnosticianApi {
    pub fn new(server_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(server_url).with_context(|| format!("invalid server url '{server_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("server url '{server_url}' cannot carry a path"));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiClientError::Transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "api: GET");
        let response = self.http.get(url).send().await?;
        decode_response(response).await
    }

    async fn get_patients(&self, url: Url) -> ApiResult<Vec<Patient>> {
        debug!(%url, "api: GET");
        let response = self.http.get(url).send().await?;
        let records: Vec<PatientRecord> = decode_response(response).await?;
        Ok(records.into_iter().map(Patient::from).collect())
    }
}

/// Any JSON object carrying an `error` string is a failure, whatever the status;
/// some endpoints report errors with 200.
async fn decode_response<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) if status.is_success() => return Err(ApiClientError::Decode(err.to_string())),
        Err(_) => return Err(ApiClientError::server(status.as_u16(), status_text(status))),
    };

    if let Some(body) = error_body(&value) {
        return Err(ApiClientError::server(status.as_u16(), body.describe()));
    }
    if !status.is_success() {
        return Err(ApiClientError::server(status.as_u16(), status_text(status)));
    }
    serde_json::from_value(value).map_err(|err| ApiClientError::Decode(err.to_string()))
}

fn error_body(value: &Value) -> Option<ApiErrorBody> {
    match value.get("error") {
        Some(Value::String(_)) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[async_trait]
impl DiagnosticianApi for HttpDiagnosticianApi {
    async fn send_chat(&self, request: &ChatRequest) -> ApiResult<ChatReply> {
        let url = self.endpoint(&["api", "chat"])?;
        debug!(patient_id = %request.patient_id, "api: POST chat");
        let response = self.http.post(url).json(request).send().await?;
        decode_response(response).await
    }

    async fn list_patients(&self) -> ApiResult<Vec<Patient>> {
        self.get_patients(self.endpoint(&["api", "patients"])?).await
    }

    async fn patient(&self, id: &PatientId) -> ApiResult<Patient> {
        let record: PatientRecord = self.get_json(&["api", "patient", id.as_str()]).await?;
        Ok(Patient::from(record))
    }

    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
    ) -> ApiResult<CreatePatientResponse> {
        let url = self.endpoint(&["api", "patient"])?;
        let response = self.http.post(url).json(request).send().await?;
        let created: CreatePatientResponse = decode_response(response).await?;
        info!(patient_id = %created.patient_id, "api: patient created");
        Ok(created)
    }

    async fn chat_history(&self, id: &PatientId) -> ApiResult<Vec<ChatMessage>> {
        self.get_json(&["api", "chat", "history", id.as_str()]).await
    }

    async fn export_patient(&self, id: &PatientId) -> ApiResult<PatientExport> {
        self.get_json(&["api", "export", "patient", id.as_str()]).await
    }

    async fn training_summary(&self) -> ApiResult<TrainingSummary> {
        self.get_json(&["api", "training", "summary"]).await
    }

    async fn training_patients(&self, limit: usize) -> ApiResult<Vec<Patient>> {
        let mut url = self.endpoint(&["api", "training", "patients"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_patients(url).await
    }

    async fn training_patient(&self, id: &PatientId) -> ApiResult<Patient> {
        let record: PatientRecord = self
            .get_json(&["api", "training", "patient", id.as_str()])
            .await?;
        Ok(Patient::from(record))
    }

    async fn import_training_json(
        &self,
        filename: &str,
        contents: Vec<u8>,
    ) -> ApiResult<ImportResponse> {
        let url = self.endpoint(&["api", "training", "import-json"])?;
        let part = multipart::Part::bytes(contents)
            .file_name(filename.to_string())
            .mime_str("application/json")?;
        let form = multipart::Form::new().part("file", part);
        info!(filename, "api: uploading training file");
        let response = self.http.post(url).multipart(form).send().await?;
        decode_response(response).await
    }

    async fn import_training_to_store(
        &self,
        limit: usize,
    ) -> ApiResult<ImportTrainingToStoreResponse> {
        let url = self.endpoint(&["api", "training", "import"])?;
        let response = self
            .http
            .post(url)
            .json(&ImportTrainingToStoreRequest { limit })
            .send()
            .await?;
        let result: ImportTrainingToStoreResponse = decode_response(response).await?;
        info!(
            limit,
            imported = result.imported_count,
            errors = result.errors.len(),
            "api: training patients copied to store"
        );
        Ok(result)
    }

    async fn rename_training_patient(
        &self,
        request: &RenameTrainingPatientRequest,
    ) -> ApiResult<RenameTrainingPatientResponse> {
        let url = self.endpoint(&["api", "training", "rename-patient"])?;
        let response = self.http.post(url).json(request).send().await?;
        decode_response(response).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
