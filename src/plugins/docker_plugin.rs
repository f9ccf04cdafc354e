//! Docker CLI adapter: registry login and image push

use crate::core::error::TransportError;
use crate::core::traits::{ToolInvocation, ToolRunner};
use crate::discovery::image_reference::ImageReference;
use crate::security::credentials::RepositoryEndpoint;
use secrecy::ExposeSecret;
use std::sync::Arc;

pub const DOCKER: &str = "docker";

/// Drives the `docker` executable for login and push
#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn ToolRunner>,
    endpoint: Arc<RepositoryEndpoint>,
}

impl DockerCli {
    pub fn new(runner: Arc<dyn ToolRunner>, endpoint: Arc<RepositoryEndpoint>) -> Self {
        Self { runner, endpoint }
    }

    /// Log in to the registry of `reference`
    ///
    /// References without a registry host log in to the endpoint host. The
    /// secret goes to the tool on stdin, never on the command line.
    pub async fn login(&self, reference: &ImageReference) -> Result<(), TransportError> {
        let credentials = self.endpoint.credentials();
        let (Some(user), Some(secret)) = (credentials.user(), credentials.secret()) else {
            tracing::debug!("no repository credentials, skipping docker login");
            return Ok(());
        };

        let host = reference
            .registry
            .clone()
            .unwrap_or_else(|| self.endpoint.host().to_string());
        let invocation = ToolInvocation::new(
            DOCKER,
            ["login", host.as_str(), "--username", user, "--password-stdin"],
        )
        .with_stdin(secret.expose_secret().as_bytes().to_vec());

        tracing::info!(registry = %host, user = %user, "docker login");
        self.run(invocation).await
    }

    pub async fn push(&self, reference: &ImageReference) -> Result<(), TransportError> {
        tracing::info!(image = %reference, "docker push");
        self.run(ToolInvocation::new(DOCKER, ["push".to_string(), reference.to_string()]))
            .await
    }

    async fn run(&self, invocation: ToolInvocation) -> Result<(), TransportError> {
        let output = self
            .runner
            .run(invocation)
            .await
            .map_err(|e| TransportError::Tool {
                tool: DOCKER.to_string(),
                message: e.to_string(),
            })?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::Tool {
                tool: DOCKER.to_string(),
                message: self.endpoint.mask(&output.summary()),
            })
        }
    }
}
