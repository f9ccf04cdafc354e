//! Artifactory REST transport
//!
//! Idempotent reads (version, manifest, layer details) are retried with
//! exponential backoff. Uploads are attempted once; the caller decides what
//! to do with a failure. Container login and push go through the Docker CLI.

use crate::core::error::TransportError;
use crate::core::retry::RetryManager;
use crate::core::traits::{
    DependencyId, Dialect, ImageLayer, ImageManifest, PackageArtifact, PackageFile,
    RepositoryTransport,
};
use crate::discovery::go_module::escape_module_path;
use crate::discovery::image_reference::ImageReference;
use crate::orchestration::build_info::{Artifact, BuildProperties};
use crate::plugins::docker_plugin::DockerCli;
use crate::security::credentials::{Credentials, RepositoryEndpoint};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct StorageChecksums {
    sha256: Option<String>,
    md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageInfo {
    path: Option<String>,
    checksums: StorageChecksums,
}

pub struct ArtifactoryTransport {
    client: Client,
    endpoint: Arc<RepositoryEndpoint>,
    retry: RetryManager,
    docker: DockerCli,
}

impl ArtifactoryTransport {
    pub fn new(
        endpoint: Arc<RepositoryEndpoint>,
        timeout: Duration,
        docker: DockerCli,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            retry: RetryManager::default(),
            docker,
        })
    }

    pub fn with_retry(mut self, retry: RetryManager) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.url(), path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.endpoint.credentials() {
            Credentials::Anonymous => request,
            Credentials::Basic { user, password } => {
                request.basic_auth(user, Some(password.expose_secret()))
            }
            Credentials::Token { token, .. } => request.bearer_auth(token.expose_secret()),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(self.endpoint.mask(&e.to_string())))
    }

    async fn check(response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            url
        } else {
            format!("{}: {}", url, body.trim())
        };
        Err(match status {
            StatusCode::NOT_FOUND => TransportError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TransportError::Unauthorized(message)
            }
            other => TransportError::Rejected {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.url(path);
        let url = url.as_str();
        let this = self;
        self.retry
            .retry(move || async move {
                let response = Self::check(this.send(this.client.get(url)).await?).await?;
                response
                    .json::<T>()
                    .await
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))
            })
            .await
    }

    async fn upload(&self, path: String, file: &PackageFile) -> Result<Artifact, TransportError> {
        let url = self.url(&path);
        let sha256 = hex::encode(Sha256::digest(&file.content));
        let request = self
            .client
            .put(&url)
            .header("X-Checksum-Sha256", sha256)
            .body(file.content.clone());
        let response = self.send(request).await?;
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(path = %path, "artifact already present");
        } else {
            Self::check(response).await?;
        }
        let stored_path = path.split(';').next().unwrap_or(&path).to_string();
        Ok(Artifact::from_bytes(&file.remote_name, &file.content).with_path(stored_path))
    }

    fn go_upload_path(
        target_repo: &str,
        module: &str,
        file: &PackageFile,
        dialect: Dialect,
        properties: &BuildProperties,
    ) -> String {
        let module = escape_module_path(module);
        match dialect {
            Dialect::Extended => format!(
                "api/go/{}/{}/@v/{}{}",
                target_repo,
                module,
                file.remote_name,
                properties.matrix_params()
            ),
            Dialect::Legacy => format!("{}/{}/@v/{}", target_repo, module, file.remote_name),
        }
    }

    async fn upload_all(
        &self,
        target_repo: &str,
        module: &str,
        files: &[PackageFile],
        dialect: Dialect,
        properties: &BuildProperties,
    ) -> Result<Vec<Artifact>, TransportError> {
        let mut artifacts = Vec::with_capacity(files.len());
        for file in files {
            let path = Self::go_upload_path(target_repo, module, file, dialect, properties);
            artifacts.push(self.upload(path, file).await?);
        }
        Ok(artifacts)
    }
}

/// Storage path of a stored image layer, digest `sha256:x` becomes `sha256__x`
fn layer_file_name(digest: &str) -> String {
    digest.replacen(':', "__", 1)
}

#[async_trait]
impl RepositoryTransport for ArtifactoryTransport {
    async fn get_version(&self) -> Result<String, TransportError> {
        let response: VersionResponse = self.get_json("api/system/version").await?;
        Ok(response.version)
    }

    async fn login(&self, reference: &ImageReference) -> Result<(), TransportError> {
        self.docker.login(reference).await
    }

    async fn publish_package(
        &self,
        target_repo: &str,
        package: &PackageArtifact,
        dialect: Dialect,
        properties: &BuildProperties,
    ) -> Result<Vec<Artifact>, TransportError> {
        tracing::info!(
            module = %package.name,
            version = %package.version,
            repo = %target_repo,
            ?dialect,
            "publishing package"
        );
        self.upload_all(target_repo, &package.name, &package.files, dialect, properties)
            .await
    }

    async fn publish_dependency(
        &self,
        target_repo: &str,
        id: &DependencyId,
        files: &[PackageFile],
        dialect: Dialect,
    ) -> Result<Vec<Artifact>, TransportError> {
        tracing::debug!(dependency = %id, repo = %target_repo, "publishing dependency");
        self.upload_all(target_repo, &id.name, files, dialect, &BuildProperties::default())
            .await
    }

    async fn push_image(&self, reference: &ImageReference) -> Result<(), TransportError> {
        self.docker.push(reference).await
    }

    async fn image_manifest(
        &self,
        target_repo: &str,
        reference: &ImageReference,
    ) -> Result<ImageManifest, TransportError> {
        let path = format!(
            "{}/{}/{}/manifest.json",
            target_repo,
            reference.repository_path(),
            reference.tag_or_default()
        );
        self.get_json(&path).await
    }

    async fn layer_details(
        &self,
        target_repo: &str,
        reference: &ImageReference,
        layer: &ImageLayer,
    ) -> Result<Artifact, TransportError> {
        let file_name = layer_file_name(&layer.digest);
        let path = format!(
            "api/storage/{}/{}/{}/{}",
            target_repo,
            reference.repository_path(),
            reference.tag_or_default(),
            file_name
        );
        let info: StorageInfo = self.get_json(&path).await?;
        let missing = |field: &str| {
            TransportError::InvalidResponse(format!("{} checksum missing for {}", field, file_name))
        };
        Ok(Artifact {
            name: file_name.clone(),
            kind: "docker".to_string(),
            sha256: info.checksums.sha256.ok_or_else(|| missing("sha256"))?,
            md5: info.checksums.md5.ok_or_else(|| missing("md5"))?,
            path: info.path,
        })
    }
}
