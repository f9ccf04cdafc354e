//! Publish Executor - uploads one publication unit
//!
//! A unit is processed strictly in order: the package (if any) first, then
//! each dependency. A failed package aborts the unit before any dependency
//! is attempted. Dependency failures follow the configured
//! [`DependencyFailurePolicy`].

use crate::core::config::DependencyFailurePolicy;
use crate::core::error::PublishError;
use crate::core::traits::{
    DependencyId, DependencySource, PublicationUnit, PublishOutcome, RepositoryCapability,
    RepositoryTransport,
};
use crate::orchestration::build_info::{Artifact, ArtifactRecorder, BuildDependency, BuildProperties};
use std::sync::Arc;

/// Module id used for units that carry only dependencies
pub const DEPENDENCIES_MODULE: &str = "dependencies";

pub struct PublishExecutor {
    transport: Arc<dyn RepositoryTransport>,
    source: Arc<dyn DependencySource>,
    policy: DependencyFailurePolicy,
    recorder: Option<ArtifactRecorder>,
    properties: BuildProperties,
}

impl PublishExecutor {
    pub fn new(transport: Arc<dyn RepositoryTransport>, source: Arc<dyn DependencySource>) -> Self {
        Self {
            transport,
            source,
            policy: DependencyFailurePolicy::default(),
            recorder: None,
            properties: BuildProperties::default(),
        }
    }

    pub fn with_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record confirmed uploads and tag packages with the build properties
    pub fn with_build_info(
        mut self,
        recorder: Option<ArtifactRecorder>,
        properties: BuildProperties,
    ) -> Self {
        self.recorder = recorder;
        self.properties = properties;
        self
    }

    pub async fn publish(
        &self,
        target_repo: &str,
        unit: &PublicationUnit,
        capability: RepositoryCapability,
    ) -> PublishOutcome {
        let dialect = capability.dialect();
        let mut outcome = PublishOutcome::default();

        let module_id = match &unit.package {
            Some(package) => {
                match self
                    .transport
                    .publish_package(target_repo, package, dialect, &self.properties)
                    .await
                {
                    Ok(artifacts) => {
                        tracing::info!(
                            package = %package.name,
                            version = %package.version,
                            files = artifacts.len(),
                            "published package"
                        );
                        if let Some(recorder) = &self.recorder {
                            recorder.record_artifacts(&package.name, artifacts);
                        }
                        outcome.succeeded += 1;
                    }
                    Err(e) => {
                        outcome.failed = 1;
                        outcome.error = Some(e.into_publish_error(format!(
                            "package {}:{}",
                            package.name, package.version
                        )));
                        return outcome;
                    }
                }
                package.name.as_str()
            }
            None => DEPENDENCIES_MODULE,
        };

        let mut failures = Vec::new();
        for id in &unit.dependencies {
            match self.publish_dependency(target_repo, id, capability).await {
                Ok(artifacts) => {
                    if let Some(recorder) = &self.recorder {
                        recorder.record_dependencies(module_id, vec![dependency_entry(id, &artifacts)]);
                    }
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(dependency = %id, error = %e, "dependency publish failed");
                    match self.policy {
                        DependencyFailurePolicy::FailFast => {
                            outcome.error = Some(e);
                            return outcome;
                        }
                        DependencyFailurePolicy::ContinueOnError => failures.push(id.to_string()),
                    }
                }
            }
        }

        if !failures.is_empty() {
            outcome.error = Some(PublishError::DependenciesFailed { failed: failures });
        }
        outcome
    }

    async fn publish_dependency(
        &self,
        target_repo: &str,
        id: &DependencyId,
        capability: RepositoryCapability,
    ) -> Result<Vec<Artifact>, PublishError> {
        let step = format!("dependency {}", id);
        let files = self.source.fetch(id).await.map_err(|e| PublishError::PublishFailed {
            step: step.clone(),
            message: e.to_string(),
        })?;
        let artifacts = self
            .transport
            .publish_dependency(target_repo, id, &files, capability.dialect())
            .await
            .map_err(|e| e.into_publish_error(step))?;
        tracing::debug!(dependency = %id, files = artifacts.len(), "published dependency");
        Ok(artifacts)
    }
}

/// Build-info entry for a dependency, hashed from its module archive when present
fn dependency_entry(id: &DependencyId, artifacts: &[Artifact]) -> BuildDependency {
    let archive = artifacts
        .iter()
        .find(|a| a.kind == "zip")
        .or_else(|| artifacts.first());
    match archive {
        Some(a) => BuildDependency {
            id: id.to_string(),
            kind: a.kind.clone(),
            sha256: Some(a.sha256.clone()),
            md5: Some(a.md5.clone()),
        },
        None => BuildDependency::named(id.to_string(), ""),
    }
}
