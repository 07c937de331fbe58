use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header, Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::{
    errors::{AppError, Result},
    storage::{ObjectEntry, ObjectKey, Storage, StoredObject},
};

/// Object store reached over HTTP at `{base_url}/{namespace}/{name}`.
///
/// `PUT` answers with `{"url": ..., "bytes": ...}`; the store has no listing
/// endpoint, so metadata lives only in the record store.
pub struct RemoteStorage {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteUploadResponse {
    url: String,
    bytes: u64,
}

impl RemoteStorage {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Storage(format!("Invalid remote storage URL: {}", e)))?;

        if base_url.cannot_be_a_base() {
            return Err(AppError::Storage(format!(
                "Remote storage URL cannot hold object paths: {}",
                base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    fn object_url(&self, key: &ObjectKey) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Storage("Remote storage URL cannot hold object paths".to_string()))?
            .pop_if_empty()
            .push(&key.namespace)
            .push(&key.name);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn unavailable(action: &str, e: reqwest::Error) -> AppError {
    AppError::Storage(format!("Remote storage {} failed: {}", action, e))
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn put(&self, key: &ObjectKey, staged: &Path) -> Result<StoredObject> {
        let url = self.object_url(key)?;
        let file = tokio::fs::File::open(staged).await?;
        let length = file.metadata().await?.len();

        let response = self
            .authorize(self.client.put(url))
            .header(header::CONTENT_LENGTH, length)
            .header(header::CONTENT_TYPE, crate::utils::content_type_for(&key.name))
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| unavailable("upload", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Storage(format!("Remote storage rejected upload of {}: {}", key, status)));
        }

        let uploaded: RemoteUploadResponse = response
            .json()
            .await
            .map_err(|e| unavailable("upload", e))?;

        if uploaded.bytes != length {
            tracing::warn!(
                "Remote storage reported {} bytes for {}, sent {}",
                uploaded.bytes,
                key,
                length
            );
        }

        Ok(StoredObject {
            location: uploaded.url,
            bytes: uploaded.bytes,
        })
    }

    async fn retrieve(&self, key: &ObjectKey) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| unavailable("download", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::NotFound),
            status if status.is_success() => {
                let stream = response
                    .bytes_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
                Ok(Box::new(StreamReader::new(Box::pin(stream))))
            }
            status => Err(AppError::Storage(format!("Remote storage download of {} failed: {}", key, status))),
        }
    }

    async fn remove(&self, key: &ObjectKey) -> Result<bool> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(|e| unavailable("delete", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AppError::Storage(format!("Remote storage delete of {} failed: {}", key, status))),
        }
    }

    async fn list(&self, _namespace: &str) -> Result<Option<Vec<ObjectEntry>>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_object_url_escapes_name() {
        let storage = RemoteStorage::new("http://objects.local/bucket/", None).unwrap();
        let owner = Uuid::new_v4();
        let url = storage.object_url(&ObjectKey::new(owner, "my file #1.txt")).unwrap();

        assert_eq!(
            url.as_str(),
            format!("http://objects.local/bucket/{}/my%20file%20%231.txt", owner)
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(RemoteStorage::new("mailto:ops@example.com", None).is_err());
        assert!(RemoteStorage::new("not a url", None).is_err());
    }
}
