//! Go command flows
//!
//! `GoPublishCommand` publishes a module and/or its dependencies.
//! `GoExecCommand` runs an arbitrary `go` command resolved through the
//! repository and falls back to direct resolution when the repository
//! cannot serve a module.

use crate::core::error::PublishError;
use crate::core::traits::{
    DependencySource, PublicationUnit, PublishOutcome, RepositoryCapability, ResolutionSettings,
};
use crate::discovery::go_module::GoModule;
use crate::orchestration::build_info::{BuildDependency, BuildInfoRecord};
use crate::orchestration::context::CommandContext;
use crate::orchestration::fallback_resolver::FallbackResolver;
use crate::orchestration::publish_executor::PublishExecutor;
use crate::plugins::go_plugin::{build_module_package, GoModuleCache, GoToolchain};
use crate::validation::version_gate::{VersionGate, VersionThresholds};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GoPublishRequest {
    pub target_repo: String,
    pub module_dir: PathBuf,
    /// Publish the module itself at `version`
    pub publish_package: bool,
    pub version: String,
    /// Comma-separated `name:version` list, or `ALL`
    pub dependencies: String,
}

#[derive(Debug)]
pub struct GoPublishSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub capability: RepositoryCapability,
    pub build_info: Option<BuildInfoRecord>,
}

#[derive(Debug, Clone)]
pub struct GoExecRequest {
    pub target_repo: String,
    pub module_dir: PathBuf,
    pub args: Vec<String>,
    /// Resolution redirect; a `None` URL resolves straight from upstream
    pub resolution: ResolutionSettings,
}

#[derive(Debug)]
pub struct GoExecSummary {
    /// Result of the fallback publish, when it ran
    pub fallback: Option<PublishOutcome>,
    pub build_info: Option<BuildInfoRecord>,
}

async fn dependency_source(
    toolchain: &GoToolchain,
    source: &Option<Arc<dyn DependencySource>>,
) -> Result<Arc<dyn DependencySource>, PublishError> {
    match source {
        Some(source) => Ok(source.clone()),
        None => Ok(Arc::new(GoModuleCache::new(toolchain.module_cache_dir().await?))),
    }
}

pub struct GoPublishCommand {
    ctx: CommandContext,
    toolchain: GoToolchain,
    source: Option<Arc<dyn DependencySource>>,
}

impl GoPublishCommand {
    pub fn new(ctx: CommandContext, module_dir: impl Into<PathBuf>) -> Self {
        let toolchain = GoToolchain::new(ctx.runner.clone(), module_dir);
        Self {
            ctx,
            toolchain,
            source: None,
        }
    }

    /// Serve dependency files from `source` instead of the module cache
    pub fn with_source(mut self, source: Arc<dyn DependencySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn run(&self, request: &GoPublishRequest) -> Result<GoPublishSummary, PublishError> {
        self.toolchain.ensure_available()?;

        let gate = VersionGate::new(VersionThresholds::go());
        let capability = gate.negotiate(self.ctx.transport.as_ref()).await?;

        let aggregator = self.ctx.aggregator();
        aggregator.begin().await?;

        let module = GoModule::load(&request.module_dir).await?;
        let package = if request.publish_package {
            if request.version.trim().is_empty() {
                return Err(PublishError::Config(
                    "A version is required to publish the module".to_string(),
                ));
            }
            Some(build_module_package(&module, request.version.trim()).await?)
        } else {
            None
        };
        let unit = PublicationUnit {
            package,
            dependencies: module.select_dependencies(&request.dependencies)?,
        };

        let source = dependency_source(&self.toolchain, &self.source).await?;
        let executor = PublishExecutor::new(self.ctx.transport.clone(), source)
            .with_policy(self.ctx.policy)
            .with_build_info(aggregator.recorder(), self.ctx.build.clone());
        let (succeeded, failed) = executor
            .publish(&request.target_repo, &unit, capability)
            .await
            .into_result()?;

        let build_info = aggregator.finalize().await?;
        Ok(GoPublishSummary {
            succeeded,
            failed,
            capability,
            build_info,
        })
    }
}

pub struct GoExecCommand {
    ctx: CommandContext,
    toolchain: GoToolchain,
    source: Option<Arc<dyn DependencySource>>,
}

impl GoExecCommand {
    pub fn new(ctx: CommandContext, module_dir: impl Into<PathBuf>) -> Self {
        let toolchain = GoToolchain::new(ctx.runner.clone(), module_dir);
        Self {
            ctx,
            toolchain,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DependencySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn run(&self, request: &GoExecRequest) -> Result<GoExecSummary, PublishError> {
        self.toolchain.ensure_available()?;

        let aggregator = self.ctx.aggregator();
        aggregator.begin().await?;

        let routed = request.resolution.redirect_url.is_some();
        let fallback = match self
            .toolchain
            .run(request.args.clone(), &request.resolution)
            .await
        {
            Ok(_) => None,
            Err(e) if routed && e.triggers_fallback() => {
                tracing::info!(
                    error = %e,
                    "repository could not serve a module, publishing dependencies from upstream"
                );
                Some(self.fallback(request).await?)
            }
            Err(e) => return Err(e),
        };

        if let Some(recorder) = aggregator.recorder() {
            let module = GoModule::load(&request.module_dir).await?;
            let source = dependency_source(&self.toolchain, &self.source).await?;
            let mut dependencies = Vec::new();
            for id in module.dependencies() {
                let archive = source.fetch(&id).await.ok().and_then(|files| {
                    files.into_iter().find(|f| f.remote_name.ends_with(".zip"))
                });
                dependencies.push(match archive {
                    Some(file) => BuildDependency::from_bytes(id.to_string(), "zip", &file.content),
                    None => {
                        tracing::debug!(dependency = %id, "module archive not in cache");
                        BuildDependency::named(id.to_string(), "zip")
                    }
                });
            }
            recorder.record_dependencies(&module.module_path, dependencies);
        }

        let build_info = aggregator.finalize().await?;
        Ok(GoExecSummary {
            fallback,
            build_info,
        })
    }

    async fn fallback(&self, request: &GoExecRequest) -> Result<PublishOutcome, PublishError> {
        let gate = VersionGate::new(VersionThresholds::go());
        let capability = gate
            .negotiate(self.ctx.transport.as_ref())
            .await
            .map_err(|e| PublishError::fallback("version", e))?;
        let source = dependency_source(&self.toolchain, &self.source)
            .await
            .map_err(|e| PublishError::fallback("cache", e))?;
        FallbackResolver::new(
            Arc::new(self.toolchain.clone()),
            self.ctx.transport.clone(),
            source,
            self.ctx.policy,
            request.resolution.clone(),
        )
        .resolve_and_republish(&request.target_repo, capability)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransportError;
    use crate::core::traits::Dialect;
    use crate::orchestration::build_info::BuildProperties;
    use crate::testing::{MemoryBuildInfoStore, MockDependencySource, MockToolRunner, MockTransport};
    use tempfile::TempDir;

    const GO_MOD: &str = "module github.com/acme/hello\n\nrequire (\n\trsc.io/quote v1.5.2\n\tgolang.org/x/text v0.3.0 // indirect\n)\n";

    struct Fixture {
        dir: TempDir,
        transport: Arc<MockTransport>,
        runner: Arc<MockToolRunner>,
        store: Arc<MemoryBuildInfoStore>,
    }

    impl Fixture {
        fn new(version: &str) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("go.mod"), GO_MOD).unwrap();
            std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();
            Self {
                dir,
                transport: Arc::new(MockTransport::with_version(version)),
                runner: Arc::new(MockToolRunner::new()),
                store: Arc::new(MemoryBuildInfoStore::default()),
            }
        }

        fn ctx(&self, build: BuildProperties) -> CommandContext {
            CommandContext::new(self.transport.clone(), self.runner.clone(), self.store.clone())
                .with_build(build)
        }

        fn publish(&self, build: BuildProperties) -> GoPublishCommand {
            GoPublishCommand::new(self.ctx(build), self.dir.path())
                .with_source(Arc::new(MockDependencySource::new()))
        }

        fn exec(&self, build: BuildProperties) -> GoExecCommand {
            GoExecCommand::new(self.ctx(build), self.dir.path())
                .with_source(Arc::new(MockDependencySource::new()))
        }

        fn publish_request(&self, publish_package: bool, dependencies: &str) -> GoPublishRequest {
            GoPublishRequest {
                target_repo: "go-local".to_string(),
                module_dir: self.dir.path().to_path_buf(),
                publish_package,
                version: "v1.0.0".to_string(),
                dependencies: dependencies.to_string(),
            }
        }

        fn exec_request(&self, resolution: ResolutionSettings) -> GoExecRequest {
            GoExecRequest {
                target_repo: "go-virtual".to_string(),
                module_dir: self.dir.path().to_path_buf(),
                args: vec!["build".to_string(), "./...".to_string()],
                resolution,
            }
        }
    }

    fn proxy() -> ResolutionSettings {
        ResolutionSettings::through("GOPROXY", "https://ci:pw@repo/api/go/go-virtual")
    }

    #[tokio::test]
    async fn test_publish_package_and_all_dependencies() {
        let fixture = Fixture::new("6.5.0");

        let summary = fixture
            .publish(BuildProperties::new("build", "7"))
            .run(&fixture.publish_request(true, "ALL"))
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.capability.uses_extended_api);

        let packages = fixture.transport.published_packages();
        assert_eq!(packages[0].1, "github.com/acme/hello");
        assert_eq!(packages[0].2, Dialect::Extended);
        assert_eq!(fixture.store.general_details().len(), 1);
        let record = summary.build_info.unwrap();
        assert_eq!(record.modules[0].artifacts.len(), 3);
        assert_eq!(record.modules[0].dependencies.len(), 2);
        assert_eq!(fixture.store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_legacy_dialect_without_build_info() {
        let fixture = Fixture::new("6.2.0");

        let summary = fixture
            .publish(BuildProperties::default())
            .run(&fixture.publish_request(false, "rsc.io/quote:v1.5.2"))
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(summary.build_info.is_none());
        assert_eq!(fixture.transport.dependency_dialects(), vec![Dialect::Legacy]);
        assert!(fixture.store.general_details().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_version_stops_before_build_info() {
        let fixture = Fixture::new("6.1.9");

        let err = fixture
            .publish(BuildProperties::new("build", "7"))
            .run(&fixture.publish_request(true, "ALL"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UNSUPPORTED_REPOSITORY_VERSION");
        assert!(fixture.store.general_details().is_empty());
        assert!(fixture.transport.published_packages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_go_is_checked_first() {
        let fixture = Fixture::new("6.5.0");
        fixture.runner.without_tool("go");

        let err = fixture
            .publish(BuildProperties::default())
            .run(&fixture.publish_request(true, ""))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PREREQUISITE_MISSING");
        assert_eq!(fixture.transport.version_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_dependency_keeps_general_details_only() {
        let fixture = Fixture::new("6.5.0");
        fixture
            .transport
            .fail_dependency("rsc.io/quote", TransportError::Network("reset".to_string()));

        let err = fixture
            .publish(BuildProperties::new("build", "7"))
            .run(&fixture.publish_request(true, "ALL"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert_eq!(fixture.store.general_details().len(), 1);
        assert!(fixture.store.records().is_empty());
    }

    #[tokio::test]
    async fn test_publish_package_requires_version() {
        let fixture = Fixture::new("6.5.0");
        let mut request = fixture.publish_request(true, "");
        request.version = " ".to_string();

        let err = fixture
            .publish(BuildProperties::default())
            .run(&request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_exec_success_records_dependencies() {
        let fixture = Fixture::new("6.5.0");

        let summary = fixture
            .exec(BuildProperties::new("build", "7"))
            .run(&fixture.exec_request(proxy()))
            .await
            .unwrap();

        assert!(summary.fallback.is_none());
        let calls = fixture.runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].env[0].0, "GOPROXY");

        let record = summary.build_info.unwrap();
        assert_eq!(record.modules[0].id, "github.com/acme/hello");
        assert_eq!(record.modules[0].dependencies.len(), 2);
        assert!(record.modules[0].dependencies[0].sha256.is_some());
        assert_eq!(fixture.transport.version_calls(), 0);
    }

    #[tokio::test]
    async fn test_exec_not_found_triggers_fallback() {
        let fixture = Fixture::new("6.5.0");
        fixture.runner.fail_next(
            "go",
            "go: rsc.io/quote@v1.5.2: reading https://repo/api/go/go-virtual/rsc.io/quote/@v/v1.5.2.mod: 404 Not Found",
        );

        let summary = fixture
            .exec(BuildProperties::default())
            .run(&fixture.exec_request(proxy()))
            .await
            .unwrap();

        let outcome = summary.fallback.unwrap();
        assert_eq!(outcome.succeeded, 2);
        assert!(fixture.transport.published_packages().is_empty());

        let calls = fixture.runner.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args, vec!["mod", "download"]);
        assert!(calls[1].env.is_empty());
        assert_eq!(calls[1].env_remove, vec!["GOPROXY"]);
    }

    #[tokio::test]
    async fn test_exec_without_registry_never_falls_back() {
        let fixture = Fixture::new("6.5.0");
        fixture.runner.fail_next("go", "go: x@v1: 404 Not Found");

        let err = fixture
            .exec(BuildProperties::default())
            .run(&fixture.exec_request(ResolutionSettings::default()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ARTIFACT_NOT_FOUND_UPSTREAM");
        assert_eq!(fixture.runner.invocations().len(), 1);
        assert!(fixture.transport.published_dependencies().is_empty());
    }

    #[tokio::test]
    async fn test_exec_other_failure_is_surfaced() {
        let fixture = Fixture::new("6.5.0");
        fixture.runner.fail_next("go", "main.go:3: syntax error");

        let err = fixture
            .exec(BuildProperties::new("build", "7"))
            .run(&fixture.exec_request(proxy()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TOOL_FAILED");
        assert_eq!(fixture.store.general_details().len(), 1);
        assert!(fixture.store.records().is_empty());
    }
}
