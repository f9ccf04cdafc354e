//! Build-info aggregation
//!
//! A build-info record documents which artifacts a command produced and which
//! dependencies it consumed, keyed by build name and number. Tracking is only
//! active when both identifiers are non-empty; otherwise every operation here
//! is a no-op.
//!
//! The lifecycle is:
//!
//! 1. [`BuildInfoAggregator::begin`] persists the general-details header
//!    before anything is published.
//! 2. Publish steps append confirmed uploads through a cloneable
//!    [`ArtifactRecorder`].
//! 3. [`BuildInfoAggregator::finalize`] consumes the aggregator and persists
//!    the record once.

use crate::core::error::PublishError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard};

pub const AGENT_NAME: &str = env!("CARGO_PKG_NAME");
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A file confirmed by the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha256: String,
    pub md5: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Artifact {
    /// Build an artifact entry by hashing its content
    pub fn from_bytes(name: impl Into<String>, content: &[u8]) -> Self {
        let name = name.into();
        let kind = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();
        Self {
            name,
            kind,
            sha256: hex::encode(Sha256::digest(content)),
            md5: hex::encode(Md5::digest(content)),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A consumed dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDependency {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl BuildDependency {
    /// A dependency known only by id (no local content to hash)
    pub fn named(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            sha256: None,
            md5: None,
        }
    }

    pub fn from_bytes(id: impl Into<String>, kind: impl Into<String>, content: &[u8]) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            sha256: Some(hex::encode(Sha256::digest(content))),
            md5: Some(hex::encode(Md5::digest(content))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<BuildDependency>,
}

impl Module {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub version: String,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: AGENT_NAME.to_string(),
            version: AGENT_VERSION.to_string(),
        }
    }
}

/// Header persisted before publishing starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralDetails {
    pub name: String,
    pub number: String,
    pub started: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoRecord {
    pub name: String,
    pub number: String,
    pub started: DateTime<Utc>,
    pub agent: Agent,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Build identifiers attached to uploads as repository properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildProperties {
    pub build_name: String,
    pub build_number: String,
}

impl BuildProperties {
    pub fn new(build_name: impl Into<String>, build_number: impl Into<String>) -> Self {
        Self {
            build_name: build_name.into(),
            build_number: build_number.into(),
        }
    }

    /// True when both identifiers are present
    pub fn is_tracking(&self) -> bool {
        !self.build_name.is_empty() && !self.build_number.is_empty()
    }

    /// `;build.name=..;build.number=..` suffix, empty when not tracking
    pub fn matrix_params(&self) -> String {
        if !self.is_tracking() {
            return String::new();
        }
        format!(
            ";build.name={};build.number={}",
            self.build_name, self.build_number
        )
    }
}

/// Persistence for build-info records
#[async_trait]
pub trait BuildInfoStore: Send + Sync {
    async fn save_general_details(&self, details: &GeneralDetails) -> Result<(), PublishError>;

    async fn save_build_info(&self, record: &BuildInfoRecord) -> Result<(), PublishError>;
}

/// Shared, append-only collector of confirmed artifacts and dependencies
#[derive(Debug, Clone, Default)]
pub struct ArtifactRecorder {
    modules: Arc<Mutex<Vec<Module>>>,
}

impl ArtifactRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Module>> {
        // A panic in another recorder user leaves the list intact.
        self.modules.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_module<F: FnOnce(&mut Module)>(&self, module_id: &str, f: F) {
        let mut modules = self.lock();
        match modules.iter_mut().find(|m| m.id == module_id) {
            Some(module) => f(module),
            None => {
                let mut module = Module::new(module_id);
                f(&mut module);
                modules.push(module);
            }
        }
    }

    pub fn record_artifacts(&self, module_id: &str, artifacts: Vec<Artifact>) {
        self.with_module(module_id, |m| m.artifacts.extend(artifacts));
    }

    pub fn record_dependencies(&self, module_id: &str, dependencies: Vec<BuildDependency>) {
        self.with_module(module_id, |m| m.dependencies.extend(dependencies));
    }

    pub fn artifact_count(&self) -> usize {
        self.lock().iter().map(|m| m.artifacts.len()).sum()
    }

    /// Copy of everything recorded so far, in first-recorded module order
    pub fn modules(&self) -> Vec<Module> {
        self.lock().clone()
    }
}

/// Collects build-info for one command
pub struct BuildInfoAggregator {
    store: Arc<dyn BuildInfoStore>,
    properties: BuildProperties,
    started: DateTime<Utc>,
    recorder: ArtifactRecorder,
}

impl BuildInfoAggregator {
    pub fn new(
        store: Arc<dyn BuildInfoStore>,
        name: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            store,
            properties: BuildProperties::new(name, number),
            started: Utc::now(),
            recorder: ArtifactRecorder::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.properties.is_tracking()
    }

    pub fn properties(&self) -> &BuildProperties {
        &self.properties
    }

    /// Persist the general-details header
    pub async fn begin(&self) -> Result<(), PublishError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let details = GeneralDetails {
            name: self.properties.build_name.clone(),
            number: self.properties.build_number.clone(),
            started: self.started,
        };
        self.store.save_general_details(&details).await?;
        tracing::debug!(
            build = %details.name,
            number = %details.number,
            "saved build general details"
        );
        Ok(())
    }

    /// Recorder for publish steps; `None` when tracking is disabled
    pub fn recorder(&self) -> Option<ArtifactRecorder> {
        self.is_enabled().then(|| self.recorder.clone())
    }

    /// Persist the accumulated record and return it
    pub async fn finalize(self) -> Result<Option<BuildInfoRecord>, PublishError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let record = BuildInfoRecord {
            name: self.properties.build_name,
            number: self.properties.build_number,
            started: self.started,
            agent: Agent::default(),
            modules: self.recorder.modules(),
        };
        self.store.save_build_info(&record).await?;
        tracing::info!(
            build = %record.name,
            number = %record.number,
            modules = record.modules.len(),
            "saved build info"
        );
        Ok(Some(record))
    }

    /// Persist a prepared set of modules in one call
    pub async fn finalize_with(
        store: Arc<dyn BuildInfoStore>,
        name: &str,
        number: &str,
        modules: Vec<Module>,
    ) -> Result<(), PublishError> {
        if name.is_empty() || number.is_empty() {
            return Ok(());
        }
        let record = BuildInfoRecord {
            name: name.to_string(),
            number: number.to_string(),
            started: Utc::now(),
            agent: Agent::default(),
            modules,
        };
        store.save_build_info(&record).await
    }
}
