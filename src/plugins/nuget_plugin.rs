//! NuGet adapter: runs the nuget client and collects project dependencies

use crate::core::error::PublishError;
use crate::core::traits::{ToolInvocation, ToolOutput, ToolRunner};
use crate::discovery::packages_config;
use crate::discovery::solution::ProjectGraph;
use crate::orchestration::build_info::{BuildDependency, Module};
use std::path::PathBuf;
use std::sync::Arc;

pub const NUGET: &str = "nuget";

/// Runs `nuget` in a solution directory
#[derive(Clone)]
pub struct NugetCli {
    runner: Arc<dyn ToolRunner>,
    dir: PathBuf,
}

impl NugetCli {
    pub fn new(runner: Arc<dyn ToolRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }

    pub fn ensure_available(&self) -> Result<PathBuf, PublishError> {
        self.runner.ensure_available(NUGET)
    }

    /// Run `nuget <args>`, restoring through `source` when given
    pub async fn run(&self, args: &[String], source: Option<&str>) -> Result<ToolOutput, PublishError> {
        let mut args = args.to_vec();
        if let Some(source) = source {
            args.push("-Source".to_string());
            args.push(source.to_string());
        }
        let output = self
            .runner
            .run(ToolInvocation::new(NUGET, args).in_dir(&self.dir))
            .await?;
        if output.success() {
            Ok(output)
        } else {
            Err(PublishError::ToolFailed {
                tool: NUGET.to_string(),
                message: output.summary(),
            })
        }
    }
}

/// One build-info module per project, listing its `packages.config` entries
pub async fn collect_project_modules(graph: &ProjectGraph) -> Result<Vec<Module>, PublishError> {
    let mut modules = Vec::new();
    for project in graph.projects() {
        let packages = packages_config::load_for_project(&project.path).await?;
        let mut module = Module::new(project.name.clone());
        module.dependencies = packages
            .into_iter()
            .map(|id| BuildDependency::named(id.to_string(), "nupkg"))
            .collect();
        modules.push(module);
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::solution::discover;
    use crate::testing::MockToolRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_appends_source() {
        let runner = Arc::new(MockToolRunner::new());
        let cli = NugetCli::new(runner.clone(), "/src/sln");

        cli.run(
            &["restore".to_string()],
            Some("https://repo/api/nuget/nuget-virtual"),
        )
        .await
        .unwrap();

        assert_eq!(
            runner.invocations()[0].args,
            vec!["restore", "-Source", "https://repo/api/nuget/nuget-virtual"]
        );
    }

    #[tokio::test]
    async fn test_run_failure() {
        let runner = Arc::new(MockToolRunner::new());
        runner.fail_next(NUGET, "Unable to find package Foo");
        let cli = NugetCli::new(runner, "/src/sln");

        let err = cli.run(&["restore".to_string()], None).await.unwrap_err();
        assert_eq!(err.code(), "TOOL_FAILED");
        assert!(err.to_string().contains("Unable to find package Foo"));
    }

    #[tokio::test]
    async fn test_collect_project_modules() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("app.sln"),
            "Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"app\", \"app\\app.csproj\", \"{D1FFA0DC-0ACC-4108-ADC1-2A71122C09AF}\"\nEndProject\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(
            dir.path().join("app/packages.config"),
            "<packages><package id=\"NUnit\" version=\"3.12.0\" /></packages>",
        )
        .unwrap();

        let graph = discover(dir.path()).await.unwrap();
        let modules = collect_project_modules(&graph).await.unwrap();

        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].id, "app");
        assert_eq!(modules[0].dependencies[0].id, "NUnit:3.12.0");
    }
}
