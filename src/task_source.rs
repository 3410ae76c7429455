//! Client for the remote workflow service

use crate::error::{FetchError, FetchResult};
use crate::models::{ApiResponse, Task, TaskDefinition};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const WORKFLOW_TASKS_PATH: &str = "v1/api/apiGetWorkflowTasks";
const TASK_FROM_GRAPH_PATH: &str = "v1/api/apiGetTaskFromGraph";
const TASK_DEFINITIONS_PATH: &str = "v1/api/apiGetTaskDefinitions";

/// Read-only queries against the workflow service.
///
/// Every call is idempotent and classifies failures into [`FetchError`];
/// nothing escapes as a panic.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// List workflow tasks with the given status (e.g. `"Waiting"`)
    async fn list_workflow_tasks(&self, status: &str) -> FetchResult<Vec<Task>>;

    /// Look up a single task of the task graph by name
    async fn get_task_from_graph(&self, name: &str) -> FetchResult<Task>;

    /// List the task definitions known to the service
    async fn list_task_definitions(&self) -> FetchResult<Vec<TaskDefinition>>;
}

/// Configuration for the HTTP task source
#[derive(Debug, Clone)]
pub struct TaskSourceConfig {
    /// Base URL of the service, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Connection timeout (default: 5 seconds)
    pub connect_timeout: Duration,
    /// Request timeout (default: 10 seconds)
    pub request_timeout: Duration,
}

impl Default for TaskSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`TaskSource`] backed by `reqwest`
pub struct HttpTaskSource {
    client: Client,
    base_url: String,
}

impl HttpTaskSource {
    pub fn new(config: TaskSourceConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("workflowd/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::transport("client_init", &e))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Join `path` onto the base URL and append query pairs (URL-escaped)
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> FetchResult<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut url = Url::parse(&base)
            .and_then(|b| b.join(path))
            .map_err(|e| FetchError::Transport {
                url: format!("{}{}", base, path),
                reason: format!("invalid URL: {}", e),
            })?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Single GET + decode of the `response` envelope
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> FetchResult<T> {
        let url_str = url.to_string();
        debug!("GET {}", url_str);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(&url_str, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(&url_str, &e))?;

        debug!("Fetched {} bytes from {}", body.len(), url_str);

        let envelope: ApiResponse<T> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                url: url_str,
                reason: e.to_string(),
            })?;

        Ok(envelope.response)
    }
}

/// `get_task_from_graph` may answer with a single object or a list
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Task>),
    One(Box<Task>),
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn list_workflow_tasks(&self, status: &str) -> FetchResult<Vec<Task>> {
        let status = status.trim();
        if status.is_empty() {
            return Err(FetchError::Transport {
                url: format!("{}/{}", self.base_url.trim_end_matches('/'), WORKFLOW_TASKS_PATH),
                reason: "task status must not be empty".to_string(),
            });
        }

        let url = self.endpoint(WORKFLOW_TASKS_PATH, &[("task_status", status)])?;
        let tasks: Vec<Task> = self.get_json(url).await?;
        debug!("Received {} task(s) with status {}", tasks.len(), status);
        Ok(tasks)
    }

    async fn get_task_from_graph(&self, name: &str) -> FetchResult<Task> {
        let url = self.endpoint(TASK_FROM_GRAPH_PATH, &[("name", name)])?;
        let url_str = url.to_string();

        match self.get_json::<OneOrMany>(url).await? {
            OneOrMany::One(task) => Ok(*task),
            OneOrMany::Many(tasks) => tasks.into_iter().next().ok_or(FetchError::Decode {
                url: url_str,
                reason: format!("no task named {:?} in response", name),
            }),
        }
    }

    async fn list_task_definitions(&self) -> FetchResult<Vec<TaskDefinition>> {
        let url = self.endpoint(TASK_DEFINITIONS_PATH, &[])?;
        let definitions: Vec<TaskDefinition> = self.get_json(url).await?;
        debug!("Received {} task definition(s)", definitions.len());
        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    fn source(base_url: &str) -> HttpTaskSource {
        HttpTaskSource::new(TaskSourceConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn endpoint_escapes_query_values() {
        let src = source("http://localhost:8000");
        let url = src
            .endpoint(TASK_FROM_GRAPH_PATH, &[("name", "fetch data&x=1")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/v1/api/apiGetTaskFromGraph?name=fetch+data%26x%3D1"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let src = source("http://localhost:8000/eden/");
        let url = src.endpoint(TASK_DEFINITIONS_PATH, &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/eden/v1/api/apiGetTaskDefinitions"
        );
    }

    #[test]
    fn invalid_base_url_is_transport_error() {
        let src = source("not a url");
        let err = src.endpoint(TASK_DEFINITIONS_PATH, &[]).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Transport);
    }

    #[tokio::test]
    async fn empty_status_is_rejected_without_io() {
        let src = source("http://localhost:8000");
        let err = src.list_workflow_tasks("  ").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Transport);
    }
}
