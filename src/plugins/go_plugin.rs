//! Go ecosystem adapter
//!
//! - [`GoToolchain`] runs the `go` executable with explicit resolution
//!   settings and turns its failures into structured errors.
//! - [`GoModuleCache`] serves dependency files from the local module
//!   download cache.
//! - [`build_module_package`] produces the `.mod` / `.info` / `.zip` triple
//!   for the module being published.

use crate::core::error::PublishError;
use crate::core::traits::{
    DependencyId, DependencySource, PackageArtifact, PackageFile, ResolutionSettings,
    ToolInvocation, ToolOutput, ToolRunner,
};
use crate::discovery::go_module::{escape_module_path, GoModule, GO_MOD_FILE};
use crate::orchestration::fallback_resolver::NativeResolver;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;

pub const GO: &str = "go";

/// Status text the Go proxy protocol returns for a missing module
const NOT_FOUND_SIGNAL: &str = "404 Not Found";

/// Map a failed `go` run to an error kind
///
/// A line whose trailing `: `-separated segment is exactly `404 Not Found`
/// (ignoring case) means the repository could not serve a module.
pub fn classify_resolution_failure(output: &ToolOutput) -> PublishError {
    let not_found = output.stderr.lines().any(|line| {
        let segment = line.rsplit(": ").next().unwrap_or(line);
        segment.trim().eq_ignore_ascii_case(NOT_FOUND_SIGNAL)
    });
    if not_found {
        PublishError::ArtifactNotFoundUpstream {
            message: output.summary(),
        }
    } else {
        PublishError::ToolFailed {
            tool: GO.to_string(),
            message: output.summary(),
        }
    }
}

/// Runs `go` inside one module directory
#[derive(Clone)]
pub struct GoToolchain {
    runner: Arc<dyn ToolRunner>,
    module_dir: PathBuf,
}

impl GoToolchain {
    pub fn new(runner: Arc<dyn ToolRunner>, module_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            module_dir: module_dir.into(),
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Fails with `PrerequisiteMissing` when `go` is not on PATH
    pub fn ensure_available(&self) -> Result<PathBuf, PublishError> {
        self.runner.ensure_available(GO)
    }

    /// Run `go <args>` with the given resolution settings
    pub async fn run<I, S>(&self, args: I, settings: &ResolutionSettings) -> Result<ToolOutput, PublishError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = ToolInvocation::new(GO, args).in_dir(&self.module_dir);
        settings.apply(&mut invocation);
        let output = self.runner.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(classify_resolution_failure(&output))
        }
    }

    /// Root of the module download cache (`go env GOMODCACHE`)
    pub async fn module_cache_dir(&self) -> Result<PathBuf, PublishError> {
        let output = self
            .run(["env", "GOMODCACHE"], &ResolutionSettings::default())
            .await?;
        let dir = output.stdout.trim();
        if dir.is_empty() {
            return Err(PublishError::ToolFailed {
                tool: GO.to_string(),
                message: "GOMODCACHE is not set".to_string(),
            });
        }
        Ok(PathBuf::from(dir))
    }
}

#[async_trait]
impl NativeResolver for GoToolchain {
    async fn download_direct(&self, settings: &ResolutionSettings) -> Result<(), PublishError> {
        self.run(["mod", "download"], settings).await.map(|_| ())
    }

    async fn local_dependencies(&self) -> Result<Vec<DependencyId>, PublishError> {
        Ok(GoModule::load(&self.module_dir).await?.dependencies())
    }
}

/// Dependency files from `<GOMODCACHE>/cache/download`
#[derive(Debug, Clone)]
pub struct GoModuleCache {
    root: PathBuf,
}

impl GoModuleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn version_dir(&self, id: &DependencyId) -> PathBuf {
        self.root
            .join("cache")
            .join("download")
            .join(escape_module_path(&id.name))
            .join("@v")
    }
}

#[async_trait]
impl DependencySource for GoModuleCache {
    /// The `.zip` and `.mod` files are required; `.info` is optional
    async fn fetch(&self, id: &DependencyId) -> Result<Vec<PackageFile>, PublishError> {
        let dir = self.version_dir(id);
        let version = escape_module_path(&id.version);
        let mut files = Vec::new();
        for (ext, required) in [("zip", true), ("mod", true), ("info", false)] {
            let remote_name = format!("{}.{}", version, ext);
            let path = dir.join(&remote_name);
            match fs::read(&path).await {
                Ok(content) => files.push(PackageFile {
                    remote_name,
                    content,
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {}
                Err(e) => return Err(PublishError::io(&path, e)),
            }
        }
        Ok(files)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModuleInfo<'a> {
    version: &'a str,
    time: String,
}

/// Package the module in `module.dir` at `version`
pub async fn build_module_package(
    module: &GoModule,
    version: &str,
) -> Result<PackageArtifact, PublishError> {
    let go_mod_path = module.dir.join(GO_MOD_FILE);
    let go_mod = fs::read(&go_mod_path)
        .await
        .map_err(|e| PublishError::io(&go_mod_path, e))?;

    let info = serde_json::to_vec(&ModuleInfo {
        version,
        time: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    })
    .map_err(|e| PublishError::Config(format!("Failed to encode module info: {}", e)))?;

    let dir = module.dir.clone();
    let prefix = format!("{}@{}", module.module_path, version);
    let archive = tokio::task::spawn_blocking(move || zip_module(&dir, &prefix))
        .await
        .map_err(|e| PublishError::ToolFailed {
            tool: "zip".to_string(),
            message: e.to_string(),
        })??;

    Ok(PackageArtifact {
        name: module.module_path.clone(),
        version: version.to_string(),
        files: vec![
            PackageFile {
                remote_name: format!("{}.mod", version),
                content: go_mod,
            },
            PackageFile {
                remote_name: format!("{}.info", version),
                content: info,
            },
            PackageFile {
                remote_name: format!("{}.zip", version),
                content: archive,
            },
        ],
    })
}

/// Directories that never belong in a module archive
fn excluded(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == ".git" || name == ".hg" || name == "vendor" || entry.path().join(GO_MOD_FILE).exists()
}

fn zip_module(dir: &Path, prefix: &str) -> Result<Vec<u8>, PublishError> {
    let zip_error = |e: zip::result::ZipError| PublishError::ToolFailed {
        tool: "zip".to_string(),
        message: e.to_string(),
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_entry(|e| !excluded(e)) {
        let entry = entry.map_err(|e| PublishError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for path in paths {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| PublishError::Config(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(&path).map_err(|e| PublishError::io(&path, e))?;
        writer
            .start_file(format!("{}/{}", prefix, name), options)
            .map_err(zip_error)?;
        writer
            .write_all(&content)
            .map_err(|e| PublishError::io(&path, e))?;
    }
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}
