//! Collaborators shared by every command flow

use crate::core::config::DependencyFailurePolicy;
use crate::core::traits::{RepositoryTransport, ToolRunner};
use crate::orchestration::build_info::{BuildInfoAggregator, BuildInfoStore, BuildProperties};
use std::sync::Arc;

/// Default size of the container layer worker pool
pub const DEFAULT_THREADS: usize = 3;

#[derive(Clone)]
pub struct CommandContext {
    pub transport: Arc<dyn RepositoryTransport>,
    pub runner: Arc<dyn ToolRunner>,
    pub store: Arc<dyn BuildInfoStore>,
    pub build: BuildProperties,
    pub policy: DependencyFailurePolicy,
    pub threads: usize,
}

impl CommandContext {
    pub fn new(
        transport: Arc<dyn RepositoryTransport>,
        runner: Arc<dyn ToolRunner>,
        store: Arc<dyn BuildInfoStore>,
    ) -> Self {
        Self {
            transport,
            runner,
            store,
            build: BuildProperties::default(),
            policy: DependencyFailurePolicy::default(),
            threads: DEFAULT_THREADS,
        }
    }

    pub fn with_build(mut self, build: BuildProperties) -> Self {
        self.build = build;
        self
    }

    pub fn with_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Fresh aggregator for one command run
    pub fn aggregator(&self) -> BuildInfoAggregator {
        BuildInfoAggregator::new(
            self.store.clone(),
            self.build.build_name.clone(),
            self.build.build_number.clone(),
        )
    }
}
