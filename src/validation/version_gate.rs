//! Version Gate - negotiates the API dialect from the repository version
//!
//! The repository reports its version once per command; the gate compares it
//! against a minimum supported version and the version that introduced the
//! extended publish API, and caches the resulting capability.
//!
//! # Example
//!
//! ```
//! use artifact_publisher::validation::version_gate::{VersionThresholds, evaluate};
//!
//! let thresholds = VersionThresholds::new("6.2.0", "6.5.0");
//!
//! assert!(!evaluate("6.2.0", &thresholds).unwrap().uses_extended_api);
//! assert!(evaluate("6.5.0", &thresholds).unwrap().uses_extended_api);
//! assert!(evaluate("6.1.9", &thresholds).is_err());
//! ```

use crate::core::error::PublishError;
use crate::core::traits::{RepositoryCapability, RepositoryTransport};
use semver::{Prerelease, Version};
use std::cmp::Ordering;
use tokio::sync::OnceCell;

/// Version string reported by development builds of the repository
pub const DEVELOPMENT_VERSION: &str = "development";

/// Thresholds for Go publishing
pub const GO_MIN_SUPPORTED_VERSION: &str = "6.2.0";
pub const GO_NEW_PUBLISH_API_VERSION: &str = "6.5.0";

/// Minimum supported and extended-API versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionThresholds {
    pub minimum_supported: String,
    pub new_api: String,
}

impl VersionThresholds {
    pub fn new(minimum_supported: impl Into<String>, new_api: impl Into<String>) -> Self {
        Self {
            minimum_supported: minimum_supported.into(),
            new_api: new_api.into(),
        }
    }

    pub fn go() -> Self {
        Self::new(GO_MIN_SUPPORTED_VERSION, GO_NEW_PUBLISH_API_VERSION)
    }
}

/// Parse a repository version, zero-padding missing numeric segments
///
/// `"6.5"` parses as `6.5.0`; a leading `v` and surrounding whitespace are
/// ignored. Pre-release suffixes are kept so `7.0.0-m1 < 7.0.0`.
pub fn parse_repository_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (core, build) = match trimmed.split_once('+') {
        Some((core, build)) => (core, Some(build)),
        None => (trimmed, None),
    };
    let (numbers, pre) = match core.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (core, None),
    };

    let segments: Vec<&str> = numbers.split('.').collect();
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }
    let mut parts = [0u64; 3];
    for (slot, segment) in parts.iter_mut().zip(&segments) {
        *slot = segment.parse().ok()?;
    }

    let mut version = Version::new(parts[0], parts[1], parts[2]);
    if let Some(pre) = pre {
        version.pre = Prerelease::new(pre).ok()?;
    }
    if let Some(build) = build {
        version.build = semver::BuildMetadata::new(build).ok()?;
    }
    Some(version)
}

/// Compare two version strings numerically per segment
///
/// Returns `None` if either string is not a version. The development
/// sentinel compares greater than any real version.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    match (a.trim() == DEVELOPMENT_VERSION, b.trim() == DEVELOPMENT_VERSION) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Greater),
        (false, true) => Some(Ordering::Less),
        (false, false) => {
            let a = parse_repository_version(a)?;
            let b = parse_repository_version(b)?;
            Some(a.cmp_precedence(&b))
        }
    }
}

/// Decide the capability for a reported version
pub fn evaluate(
    reported: &str,
    thresholds: &VersionThresholds,
) -> Result<RepositoryCapability, PublishError> {
    if reported.trim() == DEVELOPMENT_VERSION {
        return Ok(RepositoryCapability::EXTENDED);
    }

    let invalid = || PublishError::InvalidRepositoryVersion {
        version: reported.to_string(),
    };
    let threshold_error = |v: &str| PublishError::Config(format!("Invalid version threshold: {}", v));

    let reported_version = parse_repository_version(reported).ok_or_else(invalid)?;
    let minimum = parse_repository_version(&thresholds.minimum_supported)
        .ok_or_else(|| threshold_error(&thresholds.minimum_supported))?;
    let new_api = parse_repository_version(&thresholds.new_api)
        .ok_or_else(|| threshold_error(&thresholds.new_api))?;

    if reported_version.cmp_precedence(&minimum) == Ordering::Less {
        return Err(PublishError::UnsupportedRepositoryVersion {
            actual: reported.trim().to_string(),
            minimum: thresholds.minimum_supported.clone(),
        });
    }

    if reported_version.cmp_precedence(&new_api) == Ordering::Less {
        return Ok(RepositoryCapability::LEGACY);
    }

    Ok(RepositoryCapability::EXTENDED)
}

/// Negotiates and caches the repository capability for one command
pub struct VersionGate {
    thresholds: VersionThresholds,
    capability: OnceCell<RepositoryCapability>,
}

impl VersionGate {
    pub fn new(thresholds: VersionThresholds) -> Self {
        Self {
            thresholds,
            capability: OnceCell::new(),
        }
    }

    pub fn thresholds(&self) -> &VersionThresholds {
        &self.thresholds
    }

    /// Fetch the repository version and decide the capability
    ///
    /// Only the first successful call talks to the repository; later calls
    /// return the cached capability even if the remote version changed.
    pub async fn negotiate(
        &self,
        transport: &dyn RepositoryTransport,
    ) -> Result<RepositoryCapability, PublishError> {
        let capability = self
            .capability
            .get_or_try_init(|| async {
                let reported = transport
                    .get_version()
                    .await
                    .map_err(|e| e.into_publish_error("version"))?;
                let capability = evaluate(&reported, &self.thresholds)?;
                tracing::info!(
                    version = %reported.trim(),
                    extended_api = capability.uses_extended_api,
                    "negotiated repository capability"
                );
                Ok::<_, PublishError>(capability)
            })
            .await?;
        Ok(*capability)
    }

    /// Capability if already negotiated
    pub fn cached(&self) -> Option<RepositoryCapability> {
        self.capability.get().copied()
    }
}
