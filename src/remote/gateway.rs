// src/remote/gateway.rs

use reqwest::Client;
use tracing::debug;

use crate::errors::Result;
use crate::remote::{BoxFuture, ComputeGateway, JobAccepted, JobRequest, TaskEnvelope};

/// Submits stage jobs to resource endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpComputeGateway {
    client: Client,
}

impl HttpComputeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ComputeGateway for HttpComputeGateway {
    fn submit(&self, url: &str, request: &JobRequest) -> BoxFuture<'_, Result<JobAccepted>> {
        let url = url.to_string();
        let request = request.clone();

        Box::pin(async move {
            debug!(url = %url, stage = %request.stage, "posting job");
            let resp = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?;
            let envelope: TaskEnvelope<JobAccepted> = resp.json().await?;
            Ok(envelope.task)
        })
    }
}
