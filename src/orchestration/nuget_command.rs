//! NuGet flow: run the client, then record the solution's project graph

use crate::core::error::PublishError;
use crate::discovery::solution::{self, ProjectGraph};
use crate::orchestration::build_info::BuildInfoAggregator;
use crate::orchestration::context::CommandContext;
use crate::plugins::nuget_plugin::{collect_project_modules, NugetCli};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct NugetRequest {
    pub args: Vec<String>,
    /// A solution file or the directory holding the solutions
    pub solution_root: PathBuf,
    /// Package source to restore from
    pub source: Option<String>,
}

pub struct NugetCommand {
    ctx: CommandContext,
}

impl NugetCommand {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    /// Returns the discovered project graph when build-info is collected
    pub async fn run(&self, request: &NugetRequest) -> Result<Option<ProjectGraph>, PublishError> {
        let cli = NugetCli::new(self.ctx.runner.clone(), working_dir(&request.solution_root));
        cli.ensure_available()?;

        let aggregator = self.ctx.aggregator();
        aggregator.begin().await?;

        cli.run(&request.args, request.source.as_deref()).await?;

        if !aggregator.is_enabled() {
            return Ok(None);
        }

        let graph = solution::discover(&request.solution_root).await?;
        let modules = collect_project_modules(&graph).await?;
        tracing::info!(
            solutions = graph.solutions.len(),
            projects = graph.project_count(),
            "collected nuget build info"
        );
        BuildInfoAggregator::finalize_with(
            self.ctx.store.clone(),
            &self.ctx.build.build_name,
            &self.ctx.build.build_number,
            modules,
        )
        .await?;
        Ok(Some(graph))
    }
}

/// Directory nuget runs in: the root itself, or the directory of a solution file
fn working_dir(solution_root: &Path) -> PathBuf {
    if solution_root.is_dir() {
        return solution_root.to_path_buf();
    }
    solution_root
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
