//! Publish Go modules, container images and NuGet dependencies to an
//! Artifactory-style repository and record build-info for each run.

pub mod core;
pub mod discovery;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod transport;
pub mod validation;

#[cfg(test)]
mod testing;

pub use crate::core::*;
pub use orchestration::{
    CommandContext, DockerPushCommand, FileBuildInfoStore, GoExecCommand, GoPublishCommand,
    NugetCommand,
};
pub use security::{CommandError, RepositoryEndpoint, SafeCommandExecutor};
pub use transport::ArtifactoryTransport;
