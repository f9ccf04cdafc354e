//! Artifact Publisher CLI
//!
//! Publishes Go modules, container images and NuGet dependencies to an
//! Artifactory-style repository

use anyhow::{Context, Result};
use artifact_publisher::core::config::{BuildConfig, DependencyFailurePolicy, PublishConfig};
use artifact_publisher::core::config_loader::{ConfigLoadOptions, ConfigLoader};
use artifact_publisher::core::telemetry::init_tracing;
use artifact_publisher::core::traits::ResolutionSettings;
use artifact_publisher::discovery::solution;
use artifact_publisher::orchestration::build_info::BuildProperties;
use artifact_publisher::orchestration::{
    CommandContext, DockerPushCommand, DockerPushRequest, FileBuildInfoStore, GoExecCommand,
    GoExecRequest, GoPublishCommand, GoPublishRequest, NugetCommand, NugetRequest,
};
use artifact_publisher::plugins::DockerCli;
use artifact_publisher::transport::http::DEFAULT_TIMEOUT_SECS;
use artifact_publisher::{ArtifactoryTransport, PublishError, RepositoryEndpoint, SafeCommandExecutor};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Publish packages to an artifact repository
#[derive(Parser)]
#[command(name = "artifact-publisher")]
#[command(version)]
#[command(about = "Publish packages to an artifact repository with build-info", long_about = None)]
struct Cli {
    /// Project path holding .artifact-publisher.yaml (defaults to current directory)
    #[arg(long, global = true, value_name = "PATH")]
    project: Option<PathBuf>,

    /// Build name for build-info
    #[arg(long, global = true)]
    build_name: Option<String>,

    /// Build number for build-info
    #[arg(long, global = true)]
    build_number: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a Go module and/or its dependencies
    GoPublish {
        /// Target repository
        target_repo: String,

        /// Version to publish the module as
        #[arg(long)]
        version: Option<String>,

        /// Comma-separated name:version dependencies, or ALL
        #[arg(long, default_value = "")]
        deps: String,

        /// Publish only the dependencies
        #[arg(long)]
        deps_only: bool,

        /// Attempt every dependency even after one fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Run a go command resolved through the repository
    Go {
        /// Resolution repository
        #[arg(long)]
        repo: String,

        /// Resolve straight from upstream
        #[arg(long)]
        no_registry: bool,

        /// Arguments passed to go
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Push a container image
    DockerPush {
        /// Image reference
        image: String,

        /// Target repository
        target_repo: String,

        /// Layer worker pool size
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Run nuget and record the solution's dependencies
    Nuget {
        /// Solution file or directory (defaults to the project path)
        #[arg(long)]
        solution: Option<PathBuf>,

        /// Resolution repository
        #[arg(long)]
        repo: Option<String>,

        /// Arguments passed to nuget
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// List the projects of the solutions under a path
    Discover {
        /// Solution file or directory (defaults to the project path)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(
        cli.json_logs,
        if cli.verbose { Level::DEBUG } else { Level::INFO },
    );

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            match e.downcast_ref::<PublishError>() {
                Some(publish_error) => {
                    eprintln!("[{}] {}", publish_error.code(), publish_error);
                    let actions = publish_error.suggested_actions();
                    if !actions.is_empty() {
                        eprintln!("\n💡 Suggested actions:");
                        for action in actions {
                            eprintln!("  - {}", action);
                        }
                    }
                }
                None => eprintln!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let project = cli.project.clone().unwrap_or_else(|| PathBuf::from("."));

    if let Commands::Discover { path } = &cli.command {
        return discover_command(path.clone().unwrap_or_else(|| project.clone())).await;
    }

    let config = load_config(&project, &cli).await?;
    let endpoint = Arc::new(RepositoryEndpoint::from_config(config.repository.as_ref())?);
    let ctx = build_context(&project, &config, endpoint.clone())?;

    match cli.command {
        Commands::GoPublish {
            target_repo,
            version,
            deps,
            deps_only,
            continue_on_error,
        } => {
            let ctx = if continue_on_error {
                ctx.with_policy(DependencyFailurePolicy::ContinueOnError)
            } else {
                ctx
            };
            go_publish_command(
                ctx,
                GoPublishRequest {
                    target_repo,
                    module_dir: project,
                    publish_package: !deps_only,
                    version: version.unwrap_or_default(),
                    dependencies: deps,
                },
            )
            .await
        }
        Commands::Go {
            repo,
            no_registry,
            args,
        } => {
            let settings = ResolutionSettings::through(
                config.redirect_variable(),
                endpoint.go_proxy_url(&repo),
            );
            let resolution = if no_registry {
                settings.without_redirect()
            } else {
                settings
            };
            go_exec_command(
                ctx,
                GoExecRequest {
                    target_repo: repo,
                    module_dir: project,
                    args,
                    resolution,
                },
            )
            .await
        }
        Commands::DockerPush {
            image,
            target_repo,
            threads,
        } => {
            let ctx = match threads {
                Some(threads) => ctx.with_threads(threads),
                None => ctx,
            };
            docker_push_command(ctx, DockerPushRequest { image, target_repo }).await
        }
        Commands::Nuget {
            solution,
            repo,
            args,
        } => {
            let source = repo.map(|repo| format!("{}api/nuget/{}", endpoint.url(), repo));
            nuget_command(
                ctx,
                NugetRequest {
                    args,
                    solution_root: match solution {
                        Some(path) if path.is_relative() => project.join(path),
                        Some(path) => path,
                        None => project,
                    },
                    source,
                },
            )
            .await
        }
        Commands::Discover { .. } => unreachable!("discover returns before configuration is loaded"),
    }
}

async fn load_config(project: &Path, cli: &Cli) -> Result<PublishConfig> {
    let cli_config = (cli.build_name.is_some() || cli.build_number.is_some()).then(|| PublishConfig {
        build: Some(BuildConfig {
            name: cli.build_name.clone(),
            number: cli.build_number.clone(),
            store_dir: None,
        }),
        publish: None,
        security: None,
        ..Default::default()
    });

    let config = ConfigLoader::load(ConfigLoadOptions::from_env(project, cli_config)).await?;
    let validation = ConfigLoader::validate(&config);
    if !validation.warnings.is_empty() || !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
    }
    if !validation.valid {
        return Err(PublishError::Config("invalid configuration".to_string()).into());
    }
    Ok(config)
}

fn build_context(
    project: &Path,
    config: &PublishConfig,
    endpoint: Arc<RepositoryEndpoint>,
) -> Result<CommandContext> {
    let mut executor = SafeCommandExecutor::new(project)
        .with_context(|| format!("Invalid project path: {}", project.display()))?;
    if let Some(secs) = config.publish.as_ref().and_then(|p| p.tool_timeout_secs) {
        executor.set_timeout(Duration::from_secs(secs));
    }
    let runner = Arc::new(executor);

    let timeout = config
        .repository
        .as_ref()
        .and_then(|r| r.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let docker = DockerCli::new(runner.clone(), endpoint.clone());
    let transport = ArtifactoryTransport::new(endpoint, Duration::from_secs(timeout), docker)
        .context("Failed to create HTTP client")?;

    let store_dir = match config.build.as_ref().and_then(|b| b.store_dir.clone()) {
        Some(dir) => PathBuf::from(dir),
        None => std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| project.to_path_buf())
            .join(".artifact-publisher")
            .join("build-info"),
    };

    let (name, number) = config.build_identifiers();
    Ok(CommandContext::new(
        Arc::new(transport),
        runner,
        Arc::new(FileBuildInfoStore::new(store_dir)),
    )
    .with_build(BuildProperties::new(name, number))
    .with_policy(config.dependency_failure_policy())
    .with_threads(config.threads()))
}

async fn go_publish_command(ctx: CommandContext, request: GoPublishRequest) -> Result<i32> {
    println!("\n📦 Publishing Go module to {}\n", request.target_repo);

    let summary = GoPublishCommand::new(ctx, &request.module_dir)
        .run(&request)
        .await?;

    println!(
        "  Repository API: {}",
        if summary.capability.uses_extended_api {
            "extended"
        } else {
            "legacy"
        }
    );
    println!("  ✅ Succeeded: {}", summary.succeeded);
    if summary.failed > 0 {
        println!("  ❌ Failed: {}", summary.failed);
    }
    if let Some(record) = &summary.build_info {
        println!("  📝 Build-info saved: {} #{}", record.name, record.number);
    }

    if summary.failed > 0 {
        println!("\n❌ Publishing finished with failures");
        Ok(1)
    } else {
        println!("\n✅ Publishing completed successfully!");
        Ok(0)
    }
}

async fn go_exec_command(ctx: CommandContext, request: GoExecRequest) -> Result<i32> {
    let summary = GoExecCommand::new(ctx, &request.module_dir)
        .run(&request)
        .await?;

    if let Some(outcome) = &summary.fallback {
        println!(
            "\n🔁 Resolved from upstream and published {} dependencies to {}",
            outcome.succeeded, request.target_repo
        );
    }
    if let Some(record) = &summary.build_info {
        println!("📝 Build-info saved: {} #{}", record.name, record.number);
    }
    Ok(0)
}

async fn docker_push_command(ctx: CommandContext, request: DockerPushRequest) -> Result<i32> {
    println!("\n🐳 Pushing {}\n", request.image);

    let summary = DockerPushCommand::new(ctx).run(&request).await?;

    println!("  ✅ Pushed {}", summary.pushed);
    if let Some(record) = &summary.build_info {
        let artifacts: usize = record.modules.iter().map(|m| m.artifacts.len()).sum();
        println!(
            "  📝 Build-info saved: {} #{} ({} artifacts)",
            record.name, record.number, artifacts
        );
    }
    Ok(0)
}

async fn nuget_command(ctx: CommandContext, request: NugetRequest) -> Result<i32> {
    let graph = NugetCommand::new(ctx).run(&request).await?;

    if let Some(graph) = graph {
        println!(
            "\n📝 Build-info recorded for {} projects in {} solutions",
            graph.project_count(),
            graph.solutions.len()
        );
    }
    Ok(0)
}

async fn discover_command(path: PathBuf) -> Result<i32> {
    println!("\n🔍 Solutions under {}\n", path.display());

    let graph = solution::discover(&path).await?;
    if graph.is_empty() {
        println!("  No projects found");
        return Ok(0);
    }

    for sln in &graph.solutions {
        println!("📄 {}", sln.path.display());
        for project in &sln.projects {
            println!("  - {} ({})", project.name, project.path.display());
        }
    }
    println!();
    Ok(0)
}
