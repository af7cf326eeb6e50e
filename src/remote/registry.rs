// src/remote/registry.rs

use reqwest::{Client, StatusCode};

use crate::errors::{Result, StagehandError};
use crate::remote::{join_url, ArtifactRegistry, BoxFuture, NewArtifact, RegisteredArtifact};

/// Artifact registry reached over HTTP.
///
/// - `HEAD /artifact/sri/{token}`: 200 when known, 404 when not
/// - `GET /artifact/sri/{token}`: registered artifacts for the hash
/// - `POST /artifact`: register a new artifact
#[derive(Debug, Clone)]
pub struct HttpArtifactRegistry {
    client: Client,
    base_url: String,
}

impl HttpArtifactRegistry {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sri_url(&self, sri_urlsafe: &str) -> String {
        join_url(&self.base_url, &format!("artifact/sri/{sri_urlsafe}"))
    }
}

impl ArtifactRegistry for HttpArtifactRegistry {
    fn exists(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<bool>> {
        let url = self.sri_url(sri_urlsafe);

        Box::pin(async move {
            let resp = self.client.head(&url).send().await?;
            match resp.status() {
                s if s.is_success() => Ok(true),
                s if s == StatusCode::NOT_FOUND => Ok(false),
                other => Err(StagehandError::Artifact(format!(
                    "artifact registry answered {other} for {url}"
                ))),
            }
        })
    }

    fn get(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<Vec<RegisteredArtifact>>> {
        let url = self.sri_url(sri_urlsafe);

        Box::pin(async move {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StagehandError::Artifact(format!("fetching {url}: {e}")))?;
            let artifacts: Vec<RegisteredArtifact> = resp.json().await?;
            Ok(artifacts)
        })
    }

    fn register(&self, artifact: &NewArtifact) -> BoxFuture<'_, Result<()>> {
        let url = join_url(&self.base_url, "artifact");
        let artifact = artifact.clone();

        Box::pin(async move {
            self.client
                .post(&url)
                .json(&artifact)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    StagehandError::Artifact(format!("registering {} at {url}: {e}", artifact.uri))
                })?;
            Ok(())
        })
    }
}
