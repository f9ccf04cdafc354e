//! Orchestration layer for package publication
//!
//! Command flows for each package manager, the shared publish executor and
//! fallback resolver, and build-info aggregation.

pub mod build_info;
pub mod build_info_store;
pub mod context;
pub mod docker_command;
pub mod fallback_resolver;
pub mod go_command;
pub mod nuget_command;
pub mod publish_executor;

// Re-export main types for convenience
pub use build_info::{BuildInfoAggregator, BuildInfoRecord, BuildInfoStore, BuildProperties};
pub use build_info_store::FileBuildInfoStore;
pub use context::CommandContext;
pub use docker_command::{DockerPushCommand, DockerPushRequest, DockerPushSummary};
pub use fallback_resolver::{FallbackResolver, NativeResolver};
pub use go_command::{
    GoExecCommand, GoExecRequest, GoExecSummary, GoPublishCommand, GoPublishRequest,
    GoPublishSummary,
};
pub use nuget_command::{NugetCommand, NugetRequest};
pub use publish_executor::PublishExecutor;
