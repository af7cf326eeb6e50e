// src/remote/tracker.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::errors::{Result, StagehandError};
use crate::remote::{
    join_url, BoxFuture, NewTask, TaskEnvelope, TaskEvent, TaskStatus, TaskTracker,
};

#[derive(Debug, Deserialize)]
struct IssuedTask {
    task_id: String,
}

/// Task tracker reached over HTTP.
///
/// Routes, relative to the configured base URL:
/// - `POST /` issues a task id
/// - `POST /{task_id}` records a status update
/// - `GET /{thread_id}/events` lists a thread's events
#[derive(Debug, Clone)]
pub struct HttpTaskTracker {
    client: Client,
    base_url: String,
}

impl HttpTaskTracker {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl TaskTracker for HttpTaskTracker {
    fn request_task(&self, request: &NewTask) -> BoxFuture<'_, Result<String>> {
        let request = request.clone();

        Box::pin(async move {
            let resp = self
                .client
                .post(&self.base_url)
                .json(&request)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    StagehandError::TaskTracker(format!(
                        "requesting new task id from {}: {e}",
                        self.base_url
                    ))
                })?;

            let envelope: TaskEnvelope<IssuedTask> = resp.json().await?;
            debug!(task_id = %envelope.task.task_id, "received task from tracker");
            Ok(envelope.task.task_id)
        })
    }

    fn update_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let url = join_url(&self.base_url, task_id);
        let body = json!({ "status": status, "message": message });

        Box::pin(async move {
            self.client
                .post(&url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StagehandError::TaskTracker(format!("updating task at {url}: {e}")))?;
            Ok(())
        })
    }

    fn thread_events(&self, thread_id: &str) -> BoxFuture<'_, Result<Vec<TaskEvent>>> {
        let url = join_url(&self.base_url, &format!("{thread_id}/events"));

        Box::pin(async move {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    StagehandError::TaskTracker(format!("fetching events from {url}: {e}"))
                })?;
            let events: Vec<TaskEvent> = resp.json().await?;
            Ok(events)
        })
    }
}
