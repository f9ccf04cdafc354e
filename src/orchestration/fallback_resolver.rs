//! Fallback Resolver - recovers from artifacts missing in the repository
//!
//! When resolution through the repository reports an artifact as not found
//! upstream, the resolver drops the repository redirect, lets the package
//! manager download everything directly, and publishes all locally present
//! dependencies so the next resolution through the repository succeeds.
//!
//! The fallback runs once. It never records build-info and never publishes
//! a package.

use crate::core::config::DependencyFailurePolicy;
use crate::core::error::PublishError;
use crate::core::traits::{
    DependencyId, DependencySource, PublicationUnit, PublishOutcome, RepositoryCapability,
    RepositoryTransport, ResolutionSettings,
};
use crate::orchestration::publish_executor::PublishExecutor;
use async_trait::async_trait;
use std::sync::Arc;

/// Native dependency resolution of a package manager
#[async_trait]
pub trait NativeResolver: Send + Sync {
    /// Download every dependency using only the given settings
    async fn download_direct(&self, settings: &ResolutionSettings) -> Result<(), PublishError>;

    /// Dependencies present locally after resolution
    async fn local_dependencies(&self) -> Result<Vec<DependencyId>, PublishError>;
}

pub struct FallbackResolver {
    resolver: Arc<dyn NativeResolver>,
    executor: PublishExecutor,
    settings: ResolutionSettings,
}

impl FallbackResolver {
    pub fn new(
        resolver: Arc<dyn NativeResolver>,
        transport: Arc<dyn RepositoryTransport>,
        source: Arc<dyn DependencySource>,
        policy: DependencyFailurePolicy,
        settings: ResolutionSettings,
    ) -> Self {
        Self {
            resolver,
            executor: PublishExecutor::new(transport, source).with_policy(policy),
            settings,
        }
    }

    pub async fn resolve_and_republish(
        &self,
        target_repo: &str,
        capability: RepositoryCapability,
    ) -> Result<PublishOutcome, PublishError> {
        let direct = self.settings.without_redirect();
        tracing::info!(
            variable = %direct.redirect_variable,
            "resolving dependencies directly from upstream"
        );

        self.resolver
            .download_direct(&direct)
            .await
            .map_err(|e| PublishError::fallback("download", e))?;

        let dependencies = self
            .resolver
            .local_dependencies()
            .await
            .map_err(|e| PublishError::fallback("collect", e))?;

        let outcome = self
            .executor
            .publish(
                target_repo,
                &PublicationUnit::dependencies_only(dependencies),
                capability,
            )
            .await;

        match outcome.error {
            Some(error) => Err(PublishError::fallback("publish", error)),
            None => {
                tracing::info!(published = outcome.succeeded, "fallback publish finished");
                Ok(outcome)
            }
        }
    }
}
