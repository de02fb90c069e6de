//! HTTP client for the batch service REST endpoints.

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use simscale_core::{
    JobHandle, JobId, JobSpec, JobSummary, NodeCounts, PoolHandle, PoolId, PoolSpec, Secret,
    TaskId, TaskSpec, TaskSummary,
};
use simscale_orchestrator::{
    BackendConfig, BackendError, JobBackend, OutputStream, PoolBackend, TaskBackend,
};

use crate::error::ClientError;
use crate::wire::{
    CloudJob, CloudPool, CloudTask, ErrorBody, JobAddParameter, ListPage, PoolAddParameter,
    PoolInformation, PoolNodeCounts, TaskAddParameter,
};

/// REST API version sent with every request unless configured otherwise.
pub const DEFAULT_API_VERSION: &str = "2023-05-01.17.0";

/// Compute backend over the batch service REST API.
pub struct HttpBackend {
    inner: reqwest::Client,
    base_url: Url,
    api_version: String,
    token: Option<Secret>,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.account_url).map_err(|e| {
            ClientError::Connection(format!("invalid account url '{}': {e}", config.account_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Connection(format!(
                "account url '{}' cannot carry a path",
                config.account_url
            )));
        }

        Ok(Self {
            inner: reqwest::Client::builder().build()?,
            base_url,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            token: config.token.clone(),
        })
    }

    /// Build `{base}/{segments...}?api-version=...`. Segments are
    /// percent-encoded individually.
    pub fn url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "Batch request");
        let builder = self.inner.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        check(builder.send().await?).await
    }

    async fn post_json<T: Serialize>(&self, url: Url, body: &T) -> Result<(), ClientError> {
        self.send(self.request(Method::POST, url).json(body)).await?;
        Ok(())
    }

    async fn delete(&self, url: Url) -> Result<(), ClientError> {
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// GET a list endpoint and follow `odata.nextLink` until exhausted.
    async fn get_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let response = self.send(self.request(Method::GET, url)).await?;
            let bytes = response.bytes().await?;
            let page: ListPage<T> = serde_json::from_slice(&bytes)?;
            items.extend(page.value);
            next = page
                .next_link
                .map(|link| {
                    Url::parse(&link).map_err(|e| {
                        ClientError::Serialization(format!("invalid next link '{link}': {e}"))
                    })
                })
                .transpose()?;
        }

        Ok(items)
    }
}

/// Turn a non-success response into [`ClientError::Status`], decoding the
/// service's error body when there is one.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => (
            err.code,
            err.message
                .map(|m| m.value)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.to_string()),
        ),
        Err(_) if body.trim().is_empty() => (None, status.to_string()),
        Err(_) => (None, body),
    };

    Err(ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl PoolBackend for HttpBackend {
    async fn pool_exists(&self, id: &PoolId) -> Result<bool, BackendError> {
        let url = self.url(["pools", id.as_str()]);
        let response = self
            .request(Method::HEAD, url)
            .send()
            .await
            .map_err(ClientError::from)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, BackendError> {
        self.post_json(self.url(["pools"]), &PoolAddParameter::from(spec))
            .await?;
        Ok(PoolHandle::new(spec.id.clone()))
    }

    async fn delete_pool(&self, id: &PoolId) -> Result<(), BackendError> {
        Ok(self.delete(self.url(["pools", id.as_str()])).await?)
    }

    async fn list_pools(&self) -> Result<Vec<PoolId>, BackendError> {
        let pools: Vec<CloudPool> = self.get_all(self.url(["pools"])).await?;
        Ok(pools.into_iter().map(|p| PoolId::new(p.id)).collect())
    }

    async fn pool_node_counts(&self, id: &PoolId) -> Result<NodeCounts, BackendError> {
        let mut url = self.url(["nodecounts"]);
        url.query_pairs_mut()
            .append_pair("$filter", &format!("poolId eq '{id}'"));

        let counts: Vec<PoolNodeCounts> = self.get_all(url).await?;
        counts
            .into_iter()
            .find(|c| c.pool_id == id.as_str())
            .map(NodeCounts::from)
            .ok_or_else(|| BackendError::NotFound(format!("pool {id}")))
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, BackendError> {
        let body = JobAddParameter {
            id: spec.id.to_string(),
            pool_info: PoolInformation {
                pool_id: spec.pool_id.to_string(),
            },
        };
        self.post_json(self.url(["jobs"]), &body).await?;
        Ok(JobHandle {
            id: spec.id.clone(),
            pool_id: spec.pool_id.clone(),
        })
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), BackendError> {
        Ok(self.delete(self.url(["jobs", id.as_str()])).await?)
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, BackendError> {
        let jobs: Vec<CloudJob> = self.get_all(self.url(["jobs"])).await?;
        Ok(jobs.into_iter().map(JobSummary::from).collect())
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), BackendError> {
        let url = self.url(["jobs", job_id.as_str(), "tasks"]);
        Ok(self.post_json(url, &TaskAddParameter::from(spec)).await?)
    }

    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<TaskSummary>, BackendError> {
        let tasks: Vec<CloudTask> = self
            .get_all(self.url(["jobs", job_id.as_str(), "tasks"]))
            .await?;
        Ok(tasks.into_iter().map(TaskSummary::from).collect())
    }

    async fn task_output(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<OutputStream, BackendError> {
        let segments = ["jobs", job_id.as_str(), "tasks", task_id.as_str(), "files"]
            .into_iter()
            .chain(path.split('/').filter(|s| !s.is_empty()));
        let response = self.send(self.request(Method::GET, self.url(segments))).await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| BackendError::from(ClientError::from(e)))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            account_name: "simbatch".to_string(),
            account_url: url.to_string(),
            api_version: None,
            token: Some(Secret::new("t0ken")),
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let b = backend("https://simbatch.westus2.batch.azure.com");
        assert_eq!(
            b.url(["pools", "cartpolepool10"]).as_str(),
            "https://simbatch.westus2.batch.azure.com/pools/cartpolepool10?api-version=2023-05-01.17.0"
        );
    }

    #[test]
    fn test_url_keeps_base_path_and_encodes_segments() {
        let b = backend("https://gateway.example.com/batch/");
        assert_eq!(
            b.url(["jobs", "Job sweep", "tasks"]).as_str(),
            "https://gateway.example.com/batch/jobs/Job%20sweep/tasks?api-version=2023-05-01.17.0"
        );
    }

    #[test]
    fn test_custom_api_version() {
        let b = HttpBackend::new(&BackendConfig {
            account_name: String::new(),
            account_url: "http://localhost:8080".to_string(),
            api_version: Some("2024-02-01.19.0".to_string()),
            token: None,
        })
        .unwrap();
        assert!(b.url(["jobs"]).as_str().ends_with("?api-version=2024-02-01.19.0"));
    }

    #[test]
    fn test_invalid_account_url() {
        let result = HttpBackend::new(&BackendConfig {
            account_name: String::new(),
            account_url: "not a url".to_string(),
            api_version: None,
            token: None,
        });
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
