//! In-memory collaborators for unit tests

use crate::core::error::{PublishError, TransportError};
use crate::core::traits::{
    DependencyId, DependencySource, Dialect, ImageLayer, ImageManifest, PackageArtifact,
    PackageFile, RepositoryTransport, ToolInvocation, ToolOutput, ToolRunner,
};
use crate::discovery::image_reference::ImageReference;
use crate::orchestration::build_info::{
    Artifact, BuildInfoRecord, BuildInfoStore, BuildProperties, GeneralDetails,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records every call; failures are injected per operation
#[derive(Default)]
pub struct MockTransport {
    version: Mutex<String>,
    version_calls: AtomicUsize,
    package_error: Mutex<Option<TransportError>>,
    dependency_errors: Mutex<HashMap<String, TransportError>>,
    login_error: Mutex<Option<TransportError>>,
    push_error: Mutex<Option<TransportError>>,
    manifest: Mutex<Option<ImageManifest>>,
    layer_errors: Mutex<HashMap<String, TransportError>>,
    layers_in_flight: AtomicUsize,
    max_layers_in_flight: AtomicUsize,
    packages: Mutex<Vec<(String, String, Dialect, BuildProperties)>>,
    dependencies: Mutex<Vec<(String, DependencyId, Dialect)>>,
    events: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn with_version(version: &str) -> Self {
        let transport = Self::default();
        transport.set_version(version);
        transport
    }

    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn fail_package(&self, error: TransportError) {
        *self.package_error.lock().unwrap() = Some(error);
    }

    pub fn fail_dependency(&self, name: &str, error: TransportError) {
        self.dependency_errors
            .lock()
            .unwrap()
            .insert(name.to_string(), error);
    }

    pub fn fail_login(&self, error: TransportError) {
        *self.login_error.lock().unwrap() = Some(error);
    }

    pub fn fail_push(&self, error: TransportError) {
        *self.push_error.lock().unwrap() = Some(error);
    }

    pub fn set_manifest(&self, manifest: ImageManifest) {
        *self.manifest.lock().unwrap() = Some(manifest);
    }

    pub fn fail_layer(&self, digest: &str, error: TransportError) {
        self.layer_errors
            .lock()
            .unwrap()
            .insert(digest.to_string(), error);
    }

    /// Highest number of concurrent `layer_details` calls seen
    pub fn max_layers_in_flight(&self) -> usize {
        self.max_layers_in_flight.load(Ordering::SeqCst)
    }

    /// `(repo, name, dialect, properties)` per package upload
    pub fn published_packages(&self) -> Vec<(String, String, Dialect, BuildProperties)> {
        self.packages.lock().unwrap().clone()
    }

    /// Dependencies attempted, in call order (including failed ones)
    pub fn published_dependencies(&self) -> Vec<DependencyId> {
        self.dependencies
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id, _)| id.clone())
            .collect()
    }

    pub fn dependency_dialects(&self) -> Vec<Dialect> {
        self.dependencies
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, d)| *d)
            .collect()
    }

    /// Ordered log of login/push/manifest/layer calls
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn event(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RepositoryTransport for MockTransport {
    async fn get_version(&self) -> Result<String, TransportError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.version.lock().unwrap().clone())
    }

    async fn login(&self, reference: &ImageReference) -> Result<(), TransportError> {
        self.event(format!("login {}", reference));
        match self.login_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn publish_package(
        &self,
        target_repo: &str,
        package: &PackageArtifact,
        dialect: Dialect,
        properties: &BuildProperties,
    ) -> Result<Vec<Artifact>, TransportError> {
        self.packages.lock().unwrap().push((
            target_repo.to_string(),
            package.name.clone(),
            dialect,
            properties.clone(),
        ));
        if let Some(error) = self.package_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(package
            .files
            .iter()
            .map(|f| Artifact::from_bytes(&f.remote_name, &f.content))
            .collect())
    }

    async fn publish_dependency(
        &self,
        target_repo: &str,
        id: &DependencyId,
        files: &[PackageFile],
        dialect: Dialect,
    ) -> Result<Vec<Artifact>, TransportError> {
        self.dependencies
            .lock()
            .unwrap()
            .push((target_repo.to_string(), id.clone(), dialect));
        if let Some(error) = self.dependency_errors.lock().unwrap().get(&id.name) {
            return Err(error.clone());
        }
        Ok(files
            .iter()
            .map(|f| Artifact::from_bytes(&f.remote_name, &f.content))
            .collect())
    }

    async fn push_image(&self, reference: &ImageReference) -> Result<(), TransportError> {
        self.event(format!("push {}", reference));
        match self.push_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn image_manifest(
        &self,
        target_repo: &str,
        reference: &ImageReference,
    ) -> Result<ImageManifest, TransportError> {
        self.event(format!("manifest {} {}", target_repo, reference));
        self.manifest
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::NotFound("manifest.json".to_string()))
    }

    async fn layer_details(
        &self,
        _target_repo: &str,
        _reference: &ImageReference,
        layer: &ImageLayer,
    ) -> Result<Artifact, TransportError> {
        self.event(format!("layer {}", layer.digest));
        let in_flight = self.layers_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_layers_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.layers_in_flight.fetch_sub(1, Ordering::SeqCst);

        let error = self.layer_errors.lock().unwrap().get(&layer.digest).cloned();
        if let Some(error) = error {
            return Err(error);
        }
        Ok(Artifact::from_bytes(
            layer.digest.replacen(':', "__", 1),
            layer.digest.as_bytes(),
        ))
    }
}

/// Scripted tool runner
#[derive(Default)]
pub struct MockToolRunner {
    missing: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<String, VecDeque<ToolOutput>>>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl MockToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_tool(&self, tool: &str) {
        self.missing.lock().unwrap().insert(tool.to_string());
    }

    /// Queue a response for the next call of `program`; unscripted calls succeed
    pub fn respond(&self, program: &str, output: ToolOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    pub fn fail_next(&self, program: &str, stderr: &str) {
        self.respond(
            program,
            ToolOutput {
                status_code: Some(1),
                stdout: String::new(),
                stderr: format!("{}\n", stderr),
            },
        );
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    fn ensure_available(&self, tool: &str) -> Result<PathBuf, PublishError> {
        if self.missing.lock().unwrap().contains(tool) {
            return Err(PublishError::PrerequisiteMissing {
                tool: tool.to_string(),
            });
        }
        Ok(PathBuf::from("/usr/bin").join(tool))
    }

    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PublishError> {
        let program = invocation.program.clone();
        self.invocations.lock().unwrap().push(invocation);
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&program)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or(ToolOutput {
            status_code: Some(0),
            ..Default::default()
        }))
    }
}

/// Serves a fixed file per dependency; unknown dependencies are missing
#[derive(Default)]
pub struct MockDependencySource {
    missing: Mutex<HashSet<String>>,
}

impl MockDependencySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, name: &str) {
        self.missing.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl DependencySource for MockDependencySource {
    async fn fetch(&self, id: &DependencyId) -> Result<Vec<PackageFile>, PublishError> {
        if self.missing.lock().unwrap().contains(&id.name) {
            return Err(PublishError::Io {
                path: PathBuf::from(&id.name),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in cache"),
            });
        }
        Ok(vec![PackageFile {
            remote_name: format!("{}.zip", id.version),
            content: id.to_string().into_bytes(),
        }])
    }
}

#[derive(Default)]
pub struct MemoryBuildInfoStore {
    details: Mutex<Vec<GeneralDetails>>,
    records: Mutex<Vec<BuildInfoRecord>>,
}

impl MemoryBuildInfoStore {
    pub fn general_details(&self) -> Vec<GeneralDetails> {
        self.details.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<BuildInfoRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildInfoStore for MemoryBuildInfoStore {
    async fn save_general_details(&self, details: &GeneralDetails) -> Result<(), PublishError> {
        self.details.lock().unwrap().push(details.clone());
        Ok(())
    }

    async fn save_build_info(&self, record: &BuildInfoRecord) -> Result<(), PublishError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
