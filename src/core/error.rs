//! Error handling for artifact publishing
//!
//! This module provides the error taxonomy shared by every stage of a publish
//! command, with error codes and recovery guidance, using the thiserror crate.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for publication operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Prerequisite errors
    #[error("[{tool}] required executable was not found on PATH")]
    PrerequisiteMissing { tool: String },

    // Repository version errors
    #[error("This operation requires repository version {minimum} or higher (reported: {actual})")]
    UnsupportedRepositoryVersion { actual: String, minimum: String },

    #[error("Repository reported an unparsable version: {version}")]
    InvalidRepositoryVersion { version: String },

    // Discovery errors
    #[error("Failed to parse {}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    // Publishing errors
    #[error("[{step}] publish failed: {message}")]
    PublishFailed { step: String, message: String },

    #[error("{} dependencies failed to publish: {}", failed.len(), failed.join(", "))]
    DependenciesFailed { failed: Vec<String> },

    #[error("Artifact not found upstream: {message}")]
    ArtifactNotFoundUpstream { message: String },

    #[error("[{reference}] login failed: {message}")]
    LoginFailed { reference: String, message: String },

    #[error("Fallback resolution failed at {step}: {source}")]
    FallbackExhausted {
        step: String,
        #[source]
        source: Box<PublishError>,
    },

    // Command execution errors
    #[error("[{tool}] command failed: {message}")]
    ToolFailed { tool: String, message: String },

    // Build-info errors
    #[error("Build-info persistence failed: {0}")]
    BuildInfo(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// Wrap an I/O error with the path that caused it
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failure of one fallback step
    pub fn fallback(step: impl Into<String>, source: PublishError) -> Self {
        Self::FallbackExhausted {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error is the "artifact absent upstream" condition that
    /// enables fallback resolution.
    pub fn triggers_fallback(&self) -> bool {
        matches!(self, Self::ArtifactNotFoundUpstream { .. })
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::PrerequisiteMissing { .. } => vec![
                "Install the package manager and make sure it is on PATH",
                "Check the PATH of the shell running the command",
            ],
            Self::UnsupportedRepositoryVersion { .. } => {
                vec!["Upgrade the artifact repository to a supported version"]
            }
            Self::InvalidRepositoryVersion { .. } => vec![
                "Check the repository URL points at the repository root",
                "Check the repository version endpoint responds with JSON",
            ],
            Self::Parse { .. } => vec![
                "Fix the malformed entry in the solution file",
                "Make sure every Project( block is closed by EndProject",
            ],
            Self::PublishFailed { .. } | Self::DependenciesFailed { .. } => vec![
                "Check the error message returned by the repository",
                "Check the target repository exists and accepts deployments",
                "Check network connectivity",
            ],
            Self::ArtifactNotFoundUpstream { .. } => {
                vec!["Check the remote repository can reach the upstream source"]
            }
            Self::LoginFailed { .. } => vec![
                "Check the repository credentials",
                "Check the registry host in the image reference",
            ],
            Self::FallbackExhausted { .. } => vec![
                "Check the dependencies can be downloaded directly from their origin",
                "Retry with --no-registry to resolve without the repository",
            ],
            Self::ToolFailed { .. } => vec![
                "Check the command output",
                "Check the required dependencies are installed",
            ],
            Self::BuildInfo(_) => vec!["Check the build-info directory is writable"],
            Self::Config(_) => vec![
                "Check .artifact-publisher.yaml",
                "Check the RT_* and BUILD_* environment variables",
            ],
            Self::Io { .. } => vec!["Check the path exists and is readable"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::PrerequisiteMissing { .. } => "PREREQUISITE_MISSING",
            Self::UnsupportedRepositoryVersion { .. } => "UNSUPPORTED_REPOSITORY_VERSION",
            Self::InvalidRepositoryVersion { .. } => "INVALID_REPOSITORY_VERSION",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::DependenciesFailed { .. } => "DEPENDENCIES_FAILED",
            Self::ArtifactNotFoundUpstream { .. } => "ARTIFACT_NOT_FOUND_UPSTREAM",
            Self::LoginFailed { .. } => "LOGIN_FAILED",
            Self::FallbackExhausted { .. } => "FALLBACK_EXHAUSTED",
            Self::ToolFailed { .. } => "TOOL_FAILED",
            Self::BuildInfo(_) => "BUILD_INFO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

/// Errors reported by the remote repository transport
///
/// The kind is structured so callers never need to inspect message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("404 Not Found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Convert into a publish error attributed to `step`
    pub fn into_publish_error(self, step: impl Into<String>) -> PublishError {
        PublishError::PublishFailed {
            step: step.into(),
            message: self.to_string(),
        }
    }

    /// Whether the repository reported the artifact as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
