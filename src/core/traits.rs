//! Core traits and types for artifact publishing
//!
//! This module defines the publication data model and the collaborator
//! interfaces (remote repository transport, package-manager tool process,
//! dependency file source) that the publish pipeline is written against.

use crate::core::error::{PublishError, TransportError};
use crate::discovery::image_reference::ImageReference;
use crate::orchestration::build_info::{Artifact, BuildProperties};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Capability
// ============================================================================

/// Shape of publish requests accepted by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Legacy,
    Extended,
}

/// Capability set negotiated with the repository for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCapability {
    pub uses_extended_api: bool,
}

impl RepositoryCapability {
    pub const LEGACY: Self = Self {
        uses_extended_api: false,
    };
    pub const EXTENDED: Self = Self {
        uses_extended_api: true,
    };

    pub fn dialect(&self) -> Dialect {
        if self.uses_extended_api {
            Dialect::Extended
        } else {
            Dialect::Legacy
        }
    }
}

// ============================================================================
// Publication units
// ============================================================================

/// A dependency to publish, identified by name and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyId {
    pub name: String,
    pub version: String,
}

impl DependencyId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for DependencyId {
    type Err = PublishError;

    /// Parse `name:version` or `name@version`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.rsplit_once('@').or_else(|| s.rsplit_once(':'));
        match split {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(PublishError::Config(format!(
                "Invalid dependency '{}', expected name:version",
                s
            ))),
        }
    }
}

/// One file of a package upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// File name relative to the package's remote directory
    pub remote_name: String,
    pub content: Vec<u8>,
}

/// A package produced by the build and ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    pub name: String,
    pub version: String,
    pub files: Vec<PackageFile>,
}

/// One thing to be published: an optional package and its dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationUnit {
    pub package: Option<PackageArtifact>,
    pub dependencies: Vec<DependencyId>,
}

impl PublicationUnit {
    pub fn dependencies_only(dependencies: Vec<DependencyId>) -> Self {
        Self {
            package: None,
            dependencies,
        }
    }
}

/// Terminal result of processing one publication unit
#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub error: Option<PublishError>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a Result, keeping the counts on success
    pub fn into_result(self) -> Result<(usize, usize), PublishError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok((self.succeeded, self.failed)),
        }
    }
}

// ============================================================================
// Container images
// ============================================================================

/// Layer descriptor from an image manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLayer {
    pub digest: String,
    #[serde(default)]
    pub size: u64,
}

/// Image manifest as stored by the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub config: ImageLayer,
    #[serde(default)]
    pub layers: Vec<ImageLayer>,
}

// ============================================================================
// Remote repository transport
// ============================================================================

/// Transport to the remote artifact repository
///
/// Implementations own the endpoint (URL and credentials) and any timeout
/// policy. Publishing an artifact that is already present is not an error.
#[async_trait]
pub trait RepositoryTransport: Send + Sync {
    /// Version string reported by the repository
    async fn get_version(&self) -> Result<String, TransportError>;

    /// Authenticate the container client against the registry of `reference`
    async fn login(&self, reference: &ImageReference) -> Result<(), TransportError>;

    /// Upload a package and return the artifacts confirmed by the repository
    async fn publish_package(
        &self,
        target_repo: &str,
        package: &PackageArtifact,
        dialect: Dialect,
        properties: &BuildProperties,
    ) -> Result<Vec<Artifact>, TransportError>;

    /// Upload the files of one dependency
    async fn publish_dependency(
        &self,
        target_repo: &str,
        id: &DependencyId,
        files: &[PackageFile],
        dialect: Dialect,
    ) -> Result<Vec<Artifact>, TransportError>;

    /// Push a (tag-normalised) image to its registry
    async fn push_image(&self, reference: &ImageReference) -> Result<(), TransportError>;

    /// Fetch the stored manifest of a pushed image
    async fn image_manifest(
        &self,
        target_repo: &str,
        reference: &ImageReference,
    ) -> Result<ImageManifest, TransportError>;

    /// Fetch checksums of one stored layer (or config blob)
    async fn layer_details(
        &self,
        target_repo: &str,
        reference: &ImageReference,
        layer: &ImageLayer,
    ) -> Result<Artifact, TransportError>;
}

// ============================================================================
// Dependency file source
// ============================================================================

/// Supplies the locally available files of a dependency
#[async_trait]
pub trait DependencySource: Send + Sync {
    async fn fetch(&self, id: &DependencyId) -> Result<Vec<PackageFile>, PublishError>;
}

// ============================================================================
// Package-manager tool process
// ============================================================================

/// Explicit redirect configuration passed to every resolving tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionSettings {
    /// Environment variable that routes resolution through the repository
    pub redirect_variable: String,
    /// Redirect target; `None` means resolve from the original upstream
    pub redirect_url: Option<String>,
}

impl ResolutionSettings {
    pub fn through(variable: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            redirect_variable: variable.into(),
            redirect_url: Some(url.into()),
        }
    }

    /// Same settings with the repository redirect removed
    pub fn without_redirect(&self) -> Self {
        Self {
            redirect_variable: self.redirect_variable.clone(),
            redirect_url: None,
        }
    }

    /// Apply the redirect to an invocation
    pub fn apply(&self, invocation: &mut ToolInvocation) {
        if self.redirect_variable.is_empty() {
            return;
        }
        match &self.redirect_url {
            Some(url) => invocation
                .env
                .push((self.redirect_variable.clone(), url.clone())),
            None => invocation.env_remove.push(self.redirect_variable.clone()),
        }
    }
}

/// One invocation of an external package-manager executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub current_dir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Captured result of a tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Last non-empty stderr line, used as the failure summary
    pub fn summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| match self.status_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Runs external package-manager executables
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Check the executable is on PATH; done once before any operation
    fn ensure_available(&self, tool: &str) -> Result<PathBuf, PublishError>;

    /// Run to completion, capturing output. A non-zero exit is not an error here.
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PublishError>;
}
