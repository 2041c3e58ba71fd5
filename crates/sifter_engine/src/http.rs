use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use sifter_core::{
    CreatedJob, JobResult, JobSpec, QueryRequest, QueryResponse, ResultRow, StatusReply,
};

use crate::services::{JobService, QueryService, ServiceError, ServiceErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub base_url: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

/// JSON-over-HTTP binding of the query and job services.
///
/// No request timeout is configured: failures come from the transport.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, ServiceError> {
        let mut base = Url::parse(&settings.base_url)
            .map_err(|err| ServiceError::new(ServiceErrorKind::InvalidUrl, err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .build()
            .map_err(|err| ServiceError::new(ServiceErrorKind::Network, err.to_string()))?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base
            .join(path)
            .map_err(|err| ServiceError::new(ServiceErrorKind::InvalidUrl, err.to_string()))
    }

    fn job_endpoint(&self, request_id: &str, action: &str) -> Result<Url, ServiceError> {
        let mut url = self.endpoint("sifter/jobs/")?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::new(ServiceErrorKind::InvalidUrl, "base url cannot hold a path"))?
            .pop_if_empty()
            .push(request_id)
            .push(action);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl QueryService for HttpBackend {
    async fn run_query(&self, request: &QueryRequest) -> Result<Vec<ResultRow>, ServiceError> {
        let url = self.endpoint("sifter/query")?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: QueryResponse = decode(response).await?;
        Ok(body.rows)
    }
}

#[async_trait::async_trait]
impl JobService for HttpBackend {
    async fn create_job(&self, spec: &JobSpec) -> Result<CreatedJob, ServiceError> {
        let url = self.endpoint("sifter/jobs")?;
        let response = self
            .client
            .post(url)
            .json(spec)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        decode(response).await
    }

    async fn get_status(&self, request_id: &str) -> Result<StatusReply, ServiceError> {
        let url = self.job_endpoint(request_id, "status")?;
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        decode(response).await
    }

    async fn get_result(&self, request_id: &str) -> Result<JobResult, ServiceError> {
        let url = self.job_endpoint(request_id, "result")?;
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        decode(response).await
    }

    async fn cancel(&self, request_id: &str) -> Result<(), ServiceError> {
        let url = self.job_endpoint(request_id, "cancel")?;
        let response = self.client.post(url).send().await.map_err(map_reqwest_error)?;
        check_status(&response)
    }
}

fn check_status(response: &Response) -> Result<(), ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ServiceError::new(
            ServiceErrorKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    check_status(&response)?;
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ServiceError::new(ServiceErrorKind::Decode, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_decode() {
        return ServiceError::new(ServiceErrorKind::Decode, err.to_string());
    }
    ServiceError::new(ServiceErrorKind::Network, err.to_string())
}
