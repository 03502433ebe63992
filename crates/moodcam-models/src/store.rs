//! On-disk model cache backed by the remote model host.

use crate::artifact::ModelArtifact;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{0} returned an empty body")]
    Empty(String),
}

/// Local paths of both loaded artifacts.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub expression_classifier: PathBuf,
}

/// Fetches artifacts from the remote host into a local directory.
pub struct ModelStore {
    dir: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

impl ModelStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            dir: dir.into(),
            base_url: base_url.into(),
            client,
        })
    }

    pub fn path_for(&self, artifact: ModelArtifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    /// Return the cached artifact, downloading it first if missing.
    ///
    /// Downloads land in a `.part` file that is renamed into place only once
    /// complete.
    pub async fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, FetchError> {
        let path = self.path_for(artifact);

        if is_cached(&path).await {
            tracing::debug!(%artifact, path = %path.display(), "using cached model");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| FetchError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let url = artifact.url(&self.base_url);
        tracing::info!(%artifact, %url, "downloading model");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::Empty(url));
        }

        let part = path.with_extension("onnx.part");
        tokio::fs::write(&part, &body)
            .await
            .map_err(|source| FetchError::Io {
                path: part.clone(),
                source,
            })?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(%artifact, bytes = body.len(), path = %path.display(), "model downloaded");
        Ok(path)
    }

    /// Fetch both artifacts concurrently. Fails if either fails.
    pub async fn fetch_all(&self) -> Result<ModelPaths, FetchError> {
        let (face_detector, expression_classifier) = tokio::try_join!(
            self.fetch(ModelArtifact::FaceDetector),
            self.fetch(ModelArtifact::ExpressionClassifier),
        )?;

        for (artifact, path) in [
            (ModelArtifact::FaceDetector, &face_detector),
            (ModelArtifact::ExpressionClassifier, &expression_classifier),
        ] {
            let bytes = tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::info!(
                %artifact,
                sha256 = %sha256_hex(&bytes),
                bytes = bytes.len(),
                "model artifact ready"
            );
        }

        Ok(ModelPaths {
            face_detector,
            expression_classifier,
        })
    }
}

async fn is_cached(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
