//! Configuration structures and types for artifact-publisher
//!
//! This module provides type-safe configuration management with serde support.

use serde::{Deserialize, Serialize};

/// Default name of the environment variable that redirects Go resolution
pub const DEFAULT_REDIRECT_VARIABLE: &str = "GOPROXY";

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishConfig {
    /// Schema version (required)
    pub version: String,

    /// Extend from base configuration file (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Remote artifact repository connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryConfig>,

    /// Build-info identifiers and storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    /// Publish options (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishSettings>,

    /// Dependency resolution redirect settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionConfig>,

    /// Security settings (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
}

/// Repository connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RepositoryConfig {
    /// Base URL, e.g. https://acme.example.com/artifactory/
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Access token; takes precedence over user/password
    #[serde(skip_serializing_if = "Option::is_none", rename = "accessToken")]
    pub access_token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none", rename = "timeoutSecs")]
    pub timeout_secs: Option<u64>,
}

/// Build-info settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BuildConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    /// Directory where build-info records are stored
    #[serde(skip_serializing_if = "Option::is_none", rename = "storeDir")]
    pub store_dir: Option<String>,
}

/// What to do when one dependency of a unit fails to publish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DependencyFailurePolicy {
    /// Stop at the first failing dependency
    #[default]
    FailFast,
    /// Attempt every dependency and report all failures
    ContinueOnError,
}

/// Publish options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSettings {
    /// Worker pool size for container layer processing (default: 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "dependencyFailurePolicy")]
    pub dependency_failure_policy: Option<DependencyFailurePolicy>,

    /// Timeout for package-manager tool invocations in seconds
    #[serde(skip_serializing_if = "Option::is_none", rename = "toolTimeoutSecs")]
    pub tool_timeout_secs: Option<u64>,
}

/// Resolution redirect settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionConfig {
    /// Environment variable that routes resolution through the repository
    #[serde(skip_serializing_if = "Option::is_none", rename = "redirectVariable")]
    pub redirect_variable: Option<String>,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Environment variable expansion settings
    #[serde(skip_serializing_if = "Option::is_none", rename = "envVarExpansion")]
    pub env_var_expansion: Option<EnvVarExpansionConfig>,
}

/// Environment variable expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVarExpansionConfig {
    /// Enable environment variable expansion (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Allowed environment variable prefixes (default: all)
    #[serde(skip_serializing_if = "Option::is_none", rename = "allowedPrefixes")]
    pub allowed_prefixes: Option<Vec<String>>,

    /// Forbidden patterns (regex) for environment variable names
    #[serde(skip_serializing_if = "Option::is_none", rename = "forbiddenPatterns")]
    pub forbidden_patterns: Option<Vec<String>>,
}

impl PublishConfig {
    pub fn threads(&self) -> usize {
        self.publish
            .as_ref()
            .and_then(|p| p.threads)
            .filter(|t| *t > 0)
            .unwrap_or(3)
    }

    pub fn dependency_failure_policy(&self) -> DependencyFailurePolicy {
        self.publish
            .as_ref()
            .and_then(|p| p.dependency_failure_policy)
            .unwrap_or_default()
    }

    pub fn redirect_variable(&self) -> String {
        self.resolution
            .as_ref()
            .and_then(|r| r.redirect_variable.clone())
            .unwrap_or_else(|| DEFAULT_REDIRECT_VARIABLE.to_string())
    }

    /// Build name and number, empty when not configured
    pub fn build_identifiers(&self) -> (String, String) {
        let build = self.build.as_ref();
        (
            build.and_then(|b| b.name.clone()).unwrap_or_default(),
            build.and_then(|b| b.number.clone()).unwrap_or_default(),
        )
    }
}

/// Default configuration values
impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            extends: None,
            repository: None,
            build: None,
            publish: Some(PublishSettings::default()),
            resolution: None,
            security: Some(SecurityConfig::default()),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            env_var_expansion: Some(EnvVarExpansionConfig {
                enabled: Some(true),
                allowed_prefixes: None,
                forbidden_patterns: None,
            }),
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            threads: Some(3),
            dependency_failure_policy: Some(DependencyFailurePolicy::FailFast),
            tool_timeout_secs: None,
        }
    }
}
