//! NuGet `packages.config` reader

use crate::core::error::PublishError;
use crate::core::traits::DependencyId;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tokio::fs;

pub const PACKAGES_CONFIG_FILE: &str = "packages.config";

lazy_static! {
    static ref PACKAGE_ELEMENT: Regex =
        Regex::new(r"<package\s+([^>]*?)/?>").expect("valid package element regex");
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"([A-Za-z]+)\s*=\s*"([^"]*)""#).expect("valid attribute regex");
}

/// Package references declared in a `packages.config` document
pub fn parse_packages_config(content: &str, path: &Path) -> Result<Vec<DependencyId>, PublishError> {
    let mut packages = Vec::new();
    for capture in PACKAGE_ELEMENT.captures_iter(content) {
        let attributes = &capture[1];
        let mut id = None;
        let mut version = None;
        for attr in ATTRIBUTE.captures_iter(attributes) {
            match &attr[1] {
                "id" => id = Some(attr[2].to_string()),
                "version" => version = Some(attr[2].to_string()),
                _ => {}
            }
        }
        match (id, version) {
            (Some(id), Some(version)) => packages.push(DependencyId::new(id, version)),
            _ => {
                let offset = capture.get(0).map(|m| m.start()).unwrap_or(0);
                return Err(PublishError::Parse {
                    path: path.to_path_buf(),
                    line: content[..offset].lines().count().max(1),
                    message: "package element without id and version".to_string(),
                });
            }
        }
    }
    Ok(packages)
}

/// Read the `packages.config` next to a project file; absent means no packages
pub async fn load_for_project(project_path: &Path) -> Result<Vec<DependencyId>, PublishError> {
    let Some(dir) = project_path.parent() else {
        return Ok(Vec::new());
    };
    let path = dir.join(PACKAGES_CONFIG_FILE);
    match fs::read_to_string(&path).await {
        Ok(content) => parse_packages_config(&content, &path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(PublishError::io(&path, e)),
    }
}
