//! File-backed build-info store
//!
//! Layout: `<root>/<hex(sha256("<name>_<number>"))>/details.json` plus one
//! `partial-<n>.json` per saved record. Every file is written to a `.tmp`
//! sibling first and renamed into place.

use crate::core::error::PublishError;
use crate::orchestration::build_info::{BuildInfoRecord, BuildInfoStore, GeneralDetails};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DETAILS_FILE: &str = "details.json";
const PARTIAL_PREFIX: &str = "partial-";

#[derive(Debug, Clone)]
pub struct FileBuildInfoStore {
    root: PathBuf,
}

impl FileBuildInfoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the files of one build
    pub fn build_dir(&self, name: &str, number: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(format!("{}_{}", name, number).as_bytes()));
        self.root.join(key)
    }

    pub async fn load_general_details(
        &self,
        name: &str,
        number: &str,
    ) -> Result<Option<GeneralDetails>, PublishError> {
        let path = self.build_dir(name, number).join(DETAILS_FILE);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_json(&path).await.map(Some)
    }

    /// Saved records of a build, oldest first
    pub async fn load_partials(
        &self,
        name: &str,
        number: &str,
    ) -> Result<Vec<BuildInfoRecord>, PublishError> {
        let dir = self.build_dir(name, number);
        let mut records = Vec::new();
        for (_, path) in partial_files(&dir).await? {
            records.push(read_json(&path).await?);
        }
        Ok(records)
    }
}

#[async_trait]
impl BuildInfoStore for FileBuildInfoStore {
    async fn save_general_details(&self, details: &GeneralDetails) -> Result<(), PublishError> {
        let dir = self.build_dir(&details.name, &details.number);
        write_json_atomic(&dir.join(DETAILS_FILE), details).await
    }

    async fn save_build_info(&self, record: &BuildInfoRecord) -> Result<(), PublishError> {
        let dir = self.build_dir(&record.name, &record.number);
        let next = partial_files(&dir)
            .await?
            .last()
            .map(|(n, _)| n + 1)
            .unwrap_or(1);
        let path = dir.join(format!("{}{}.json", PARTIAL_PREFIX, next));
        write_json_atomic(&path, record).await?;
        tracing::debug!(path = %path.display(), "wrote build info");
        Ok(())
    }
}

/// Numbered partial files in ascending order
async fn partial_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>, PublishError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PublishError::io(dir, e)),
    };
    let mut partials = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PublishError::io(dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let number = name
            .strip_prefix(PARTIAL_PREFIX)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(number) = number {
            partials.push((number, entry.path()));
        }
    }
    partials.sort_by_key(|(n, _)| *n);
    Ok(partials)
}

async fn write_json_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), PublishError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PublishError::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| PublishError::BuildInfo(format!("Failed to serialize build info: {}", e)))?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)
        .await
        .map_err(|e| PublishError::io(&temp_path, e))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| PublishError::io(path, e))?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PublishError> {
    let content = fs::read(path).await.map_err(|e| PublishError::io(path, e))?;
    serde_json::from_slice(&content).map_err(|e| {
        PublishError::BuildInfo(format!("Failed to read {}: {}", path.display(), e))
    })
}
