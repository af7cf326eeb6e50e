// src/remote/object_store.rs

use std::path::{Path, PathBuf};

use reqwest::{Client, RequestBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::model::StorageSection;
use crate::errors::{Result, StagehandError};
use crate::remote::{BoxFuture, ObjectRef, ObjectStore};

/// Object store speaking a plain REST layout:
///
/// - `PUT  {base}/{bucket}/{object}` uploads
/// - `GET  {base}/{bucket}/{object}` downloads
/// - `GET  {base}/{bucket}?prefix=..&recursive=..` lists as `[{object_name}]`
///
/// Credentials, when configured, are sent as HTTP basic auth.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpObjectStore {
    pub fn new(client: Client, storage: &StorageSection) -> Self {
        let scheme = if storage.secure { "https" } else { "http" };
        let credentials = match (&storage.access_key, &storage.secret_key) {
            (Some(access), Some(secret)) => Some((access.clone(), secret.clone())),
            _ => None,
        };

        Self {
            client,
            base_url: format!("{scheme}://{}", storage.hostname.trim_end_matches('/')),
            credentials,
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((access, secret)) => builder.basic_auth(access, Some(secret)),
            None => builder,
        }
    }

    fn object_url(&self, bucket: &str, object: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, object.trim_start_matches('/'))
    }
}

impl ObjectStore for HttpObjectStore {
    fn upload(&self, bucket: &str, object: &str, local: &Path) -> BoxFuture<'_, Result<()>> {
        let url = self.object_url(bucket, object);
        let local = local.to_path_buf();

        Box::pin(async move {
            let body = tokio::fs::read(&local).await?;
            debug!(url = %url, bytes = body.len(), "uploading object");
            self.authed(self.client.put(&url))
                .body(body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StagehandError::ObjectStore(format!("uploading to {url}: {e}")))?;
            Ok(())
        })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> BoxFuture<'_, Result<Vec<ObjectRef>>> {
        let url = format!("{}/{}", self.base_url, bucket);
        let query = [
            ("prefix", prefix.to_string()),
            ("recursive", recursive.to_string()),
        ];

        Box::pin(async move {
            let resp = self
                .authed(self.client.get(&url))
                .query(&query)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StagehandError::ObjectStore(format!("listing {url}: {e}")))?;
            let objects: Vec<ObjectRef> = resp.json().await?;
            Ok(objects)
        })
    }

    fn download(
        &self,
        bucket: &str,
        object: &ObjectRef,
        local: &Path,
    ) -> BoxFuture<'_, Result<()>> {
        let url = self.object_url(bucket, &object.object_name);
        let local = local.to_path_buf();

        Box::pin(async move {
            let bytes = self
                .authed(self.client.get(&url))
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StagehandError::ObjectStore(format!("downloading {url}: {e}")))?
                .bytes()
                .await?;
            tokio::fs::write(&local, &bytes).await?;
            Ok(())
        })
    }

    fn uri(&self, bucket: &str, object: &str) -> String {
        self.object_url(bucket, object)
    }
}

/// Object store backed by a directory: buckets are subdirectories of the
/// root and object names are relative paths inside them.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, object: &str) -> PathBuf {
        self.root.join(bucket).join(object.trim_start_matches('/'))
    }
}

impl ObjectStore for LocalObjectStore {
    fn upload(&self, bucket: &str, object: &str, local: &Path) -> BoxFuture<'_, Result<()>> {
        let dest = self.object_path(bucket, object);
        let local = local.to_path_buf();

        Box::pin(async move {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&local, &dest).await?;
            debug!(dest = ?dest, "stored object locally");
            Ok(())
        })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> BoxFuture<'_, Result<Vec<ObjectRef>>> {
        let bucket_dir = self.root.join(bucket);
        let prefix = prefix.trim_start_matches('/').to_string();

        Box::pin(async move {
            if !bucket_dir.is_dir() {
                return Ok(Vec::new());
            }

            let mut objects = Vec::new();
            for entry in WalkDir::new(&bucket_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| StagehandError::ObjectStore(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&bucket_dir) else {
                    continue;
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                let Some(rest) = name.strip_prefix(&prefix) else {
                    continue;
                };
                if !recursive && rest.trim_start_matches('/').contains('/') {
                    continue;
                }
                objects.push(ObjectRef { object_name: name });
            }
            Ok(objects)
        })
    }

    fn download(
        &self,
        bucket: &str,
        object: &ObjectRef,
        local: &Path,
    ) -> BoxFuture<'_, Result<()>> {
        let src = self.object_path(bucket, &object.object_name);
        let local = local.to_path_buf();

        Box::pin(async move {
            tokio::fs::copy(&src, &local).await?;
            Ok(())
        })
    }

    fn uri(&self, bucket: &str, object: &str) -> String {
        format!("file://{}", self.object_path(bucket, object).display())
    }
}
