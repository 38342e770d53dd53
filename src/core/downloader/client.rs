use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::{ConfigurationError, FetchError};
use crate::core::http::build_http_client;

/// Anything that can materialize a named remote resource at a local path.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Retrieve `url` into `dest` byte for byte, returning the number of bytes
    /// written. `dest` is created or truncated.
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Single-GET, streaming HTTP source. No retries.
#[derive(Debug, Clone)]
pub struct HttpArtifactSource {
    client: Client,
}

impl HttpArtifactSource {
    pub fn new(https_proxy: Option<&str>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: build_http_client(https_proxy)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Write inside a block so the handle is dropped before the caller renames.
        let written = {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;

            let mut stream = response.bytes_stream();
            let mut written = 0_u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|source| FetchError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                written = written.saturating_add(chunk.len() as u64);
            }
            file.flush().await.map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            written
        };

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_writes_exact_body() {
        let server = MockServer::start().await;
        let body = vec![0_u8, 1, 2, 3, 255, 254];
        Mock::given(method("GET"))
            .and(path("/blob.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("blob.bin");
        let source = HttpArtifactSource::new(None).unwrap();
        let written = source
            .fetch_to(&format!("{}/blob.bin", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("missing.jar");
        let source = HttpArtifactSource::new(None).unwrap();
        let err = source
            .fetch_to(&format!("{}/missing.jar", server.uri()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::DownloadFailed { status: 404, .. }));
        assert!(!dest.exists());
    }
}
