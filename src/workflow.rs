use std::{marker::PhantomData, time::Duration};

use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use crate::{
    Client, Error, Result,
    client::{Request, Route, Service, decode},
    images::random_hex,
    types::{CancelledTask, TaskParameters, TaskResult, WorkflowTask, WorkflowTaskType},
};

const DEFAULT_JOB_ID_PREFIX: &str = "sdk-workflow";

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tasks on the workflow service: upscaling, FLUX LoRA and text to video
///
/// The workflow service authenticates through the request body. A client key
/// of the form `<consumer_id>#<api_key>` provides the default consumer id.
#[derive(Clone)]
pub struct Workflow {
    client: Client,
    consumer_id: String,
    api_key: SecretString,
}

impl Workflow {
    pub(crate) fn new(client: &Client) -> Self {
        let (consumer_id, api_key) = split_api_key(client.api_key());
        Self {
            client: client.clone(),
            consumer_id: consumer_id.to_owned(),
            api_key: SecretString::from(api_key),
        }
    }

    /// Reserves a miner, then creates the task. Returns the task id.
    pub async fn execute_workflow(&self, task: WorkflowTask) -> Result<String> {
        let consumer_id = task.consumer_id.as_deref().unwrap_or(&self.consumer_id);
        let miner_id = self.resource_request(consumer_id).await?;
        tracing::debug!(%miner_id, "miner reserved");
        self.create_task(task).await
    }

    /// Runs [Self::execute_workflow] and polls every `interval` until the task
    /// settles (see [crate::types::TaskStatus::is_settled])
    ///
    /// The service's own clients wait [DEFAULT_WAIT_TIMEOUT] and poll every
    /// [DEFAULT_POLL_INTERVAL]. `interval` may not be shorter than
    /// [MIN_POLL_INTERVAL].
    pub async fn execute_workflow_and_wait_for_result(
        &self,
        task: WorkflowTask,
        timeout: Duration,
        interval: Duration,
    ) -> Result<TaskResult> {
        if interval < MIN_POLL_INTERVAL {
            return Err(Error::validation(
                "interval",
                format!("{interval:?} is shorter than {MIN_POLL_INTERVAL:?}"),
            ));
        }

        let task_id = self.execute_workflow(task).await?;
        let started = Instant::now();

        loop {
            let result = self.query_task_result(&task_id).await?;
            if result.status.is_settled() {
                return Ok(result);
            }

            if started.elapsed() > timeout {
                tracing::warn!(%task_id, ?timeout, "gave up waiting for task");
                return Err(Error::Timeout(timeout));
            }

            tracing::debug!(%task_id, status = ?result.status, "task pending");
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn resource_request(&self, consumer_id: &str) -> Result<String> {
        let assigned = Route::new(
            &self.client,
            Call::<_, MinerAssigned>::new(
                "resource_request",
                ConsumerBody {
                    consumer_id: consumer_id.to_owned(),
                    api_key: self.expose_api_key(),
                },
            ),
        )
        .await?;
        Ok(assigned.miner_id)
    }

    pub async fn create_task(&self, task: WorkflowTask) -> Result<String> {
        let prefix = task.job_id_prefix.as_deref().unwrap_or(DEFAULT_JOB_ID_PREFIX);
        let body = CreateTaskBody {
            job_id: format!("{prefix}-{}", random_hex(10)),
            task_type: task.task_type(),
            consumer_id: task.consumer_id.unwrap_or_else(|| self.consumer_id.clone()),
            api_key: task.api_key.unwrap_or_else(|| self.expose_api_key()),
            parameters: task.parameters,
            workflow_id: task.workflow_id,
            timeout_seconds: task.timeout_seconds.filter(|&secs| secs > 0),
        };

        tracing::info!(job_id = %body.job_id, task_type = ?body.task_type, "creating workflow task");

        let created =
            Route::new(&self.client, Call::<_, TaskCreated>::new("task_create", body)).await?;
        Ok(created.task_id)
    }

    pub async fn query_task_result(&self, task_id: &str) -> Result<TaskResult> {
        Route::new(
            &self.client,
            Call::<_, TaskResult>::new("task_result_query", self.task_id_body(task_id)),
        )
        .await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<CancelledTask> {
        Route::new(
            &self.client,
            Call::<_, CancelledTask>::new("task_cancel", self.task_id_body(task_id)),
        )
        .await
    }

    fn task_id_body(&self, task_id: &str) -> TaskIdBody {
        TaskIdBody {
            task_id: task_id.to_owned(),
            api_key: self.expose_api_key(),
        }
    }

    fn expose_api_key(&self) -> String {
        self.api_key.expose_secret().to_owned()
    }
}

/// `consumer#key` splits at the first `#`, a bare key has no consumer id
fn split_api_key(combined: &str) -> (&str, &str) {
    combined.split_once('#').unwrap_or(("", combined))
}

/// A POST to the workflow service
struct Call<B, M> {
    path: &'static str,
    body: B,
    model: PhantomData<fn() -> M>,
}

impl<B, M> Call<B, M> {
    fn new(path: &'static str, body: B) -> Self {
        Self {
            path,
            body,
            model: PhantomData,
        }
    }
}

impl<B, M> Request for Call<B, M>
where
    B: Serialize + Clone + Send + 'static,
    M: DeserializeOwned + Send + 'static,
{
    type Model = M;
    type Body = B;

    const SERVICE: Service = Service::Workflow;
    const AUTHORIZED: bool = false;

    fn format_uri(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str(self.path)
    }

    fn body(&self) -> Option<Self::Body> {
        Some(self.body.clone())
    }

    fn parse(raw: &str) -> Result<M> {
        decode(raw)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ConsumerBody {
    consumer_id: String,
    #[serde(rename = "apiKey")]
    api_key: String,
}

#[derive(Debug, Clone, Serialize)]
struct TaskIdBody {
    task_id: String,
    #[serde(rename = "apiKey")]
    api_key: String,
}

#[derive(Debug, Clone, Serialize)]
struct CreateTaskBody {
    job_id: String,
    task_type: WorkflowTaskType,
    consumer_id: String,
    #[serde(rename = "apiKey")]
    api_key: String,
    parameters: TaskParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MinerAssigned {
    miner_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    task_id: String,
}
