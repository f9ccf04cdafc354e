//! Solution discovery - parses .sln aggregator files into a project graph
//!
//! A solution lists its member projects as fixed-grammar blocks:
//!
//! ```text
//! Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "app", "src\app\app.csproj", "{D1FFA0DC-0ACC-4108-ADC1-2A71122C09AF}"
//! EndProject
//! ```
//!
//! Project paths are resolved against the directory of the solution file,
//! never against the process working directory.

use crate::core::error::PublishError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Extension of aggregator files
pub const SOLUTION_EXTENSION: &str = "sln";

const START_TOKEN: &str = "Project(";
const END_TOKEN: &str = "EndProject";

lazy_static! {
    static ref PROJECT_HEADER: Regex = Regex::new(
        r#"^Project\("\{([^"}]*)\}"\)\s*=\s*"([^"]*)"\s*,\s*"([^"]*)"\s*,\s*"\{?([^"}]*)\}?"\s*$"#
    )
    .expect("project header pattern is valid");
}

/// A project referenced by a solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    /// Project file path, resolved against the solution directory
    pub path: PathBuf,
    pub type_guid: String,
    pub guid: String,
}

/// One parsed aggregator file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub path: PathBuf,
    pub projects: Vec<Project>,
}

/// Solutions and projects discovered from a description root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectGraph {
    pub solutions: Vec<Solution>,
}

impl ProjectGraph {
    /// All projects, in solution order
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.solutions.iter().flat_map(|s| s.projects.iter())
    }

    pub fn project_count(&self) -> usize {
        self.solutions.iter().map(|s| s.projects.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.project_count() == 0
    }
}

/// Discover the project graph from `root`
///
/// `root` may name a single `.sln` file (only that file is parsed) or a
/// directory, in which case every `.sln` file directly inside it is parsed in
/// file-name order. A directory without solutions yields an empty graph.
pub async fn discover(root: &Path) -> Result<ProjectGraph, PublishError> {
    if is_solution_file(root) {
        let solution = load_solution(root).await?;
        return Ok(ProjectGraph {
            solutions: vec![solution],
        });
    }

    let dir = match fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => root.to_path_buf(),
        Ok(_) => root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        Err(e) => return Err(PublishError::io(root, e)),
    };

    let mut solution_paths = Vec::new();
    let mut entries = fs::read_dir(&dir)
        .await
        .map_err(|e| PublishError::io(&dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PublishError::io(&dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && is_solution_file(&path) {
            solution_paths.push(path);
        }
    }
    solution_paths.sort();

    let mut graph = ProjectGraph::default();
    for path in solution_paths {
        graph.solutions.push(load_solution(&path).await?);
    }

    tracing::debug!(
        root = %root.display(),
        solutions = graph.solutions.len(),
        projects = graph.project_count(),
        "discovered project graph"
    );

    Ok(graph)
}

/// Read and parse one solution file
pub async fn load_solution(path: &Path) -> Result<Solution, PublishError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PublishError::io(path, e))?;
    parse_solution(&content, path)
}

/// Parse solution content; `path` locates the file for resolution and errors
pub fn parse_solution(content: &str, path: &Path) -> Result<Solution, PublishError> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let lines: Vec<&str> = content.lines().collect();
    let mut projects = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index].trim();
        if !line.starts_with(START_TOKEN) {
            index += 1;
            continue;
        }

        let header_line = index + 1;
        let captures = PROJECT_HEADER.captures(line).ok_or_else(|| PublishError::Parse {
            path: path.to_path_buf(),
            line: header_line,
            message: "malformed project entry".to_string(),
        })?;

        // The block must close before the next entry starts.
        let mut end = None;
        for (offset, candidate) in lines[index + 1..].iter().enumerate() {
            let candidate = candidate.trim();
            if candidate == END_TOKEN {
                end = Some(index + 1 + offset);
                break;
            }
            if candidate.starts_with(START_TOKEN) {
                break;
            }
        }
        let end = end.ok_or_else(|| PublishError::Parse {
            path: path.to_path_buf(),
            line: header_line,
            message: format!("missing {}", END_TOKEN),
        })?;

        projects.push(Project {
            type_guid: captures[1].to_string(),
            name: captures[2].to_string(),
            path: resolve_relative(base_dir, &captures[3]),
            guid: captures[4].to_string(),
        });

        index = end + 1;
    }

    Ok(Solution {
        path: path.to_path_buf(),
        projects,
    })
}

/// Join a solution-relative path (either separator style) onto `base`
fn resolve_relative(base: &Path, raw: &str) -> PathBuf {
    raw.split(['\\', '/'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

fn is_solution_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(SOLUTION_EXTENSION))
        .unwrap_or(false)
}
