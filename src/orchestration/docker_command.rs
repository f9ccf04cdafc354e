//! Docker push flow
//!
//! Login precedes push and a failed login aborts before anything is pushed.
//! With build-info enabled, layer details are fetched by a bounded worker
//! pool and the manifest entry is recorded once every layer task has joined.

use crate::core::error::PublishError;
use crate::core::traits::ImageLayer;
use crate::discovery::image_reference::ImageReference;
use crate::orchestration::build_info::{Artifact, BuildInfoRecord};
use crate::orchestration::context::CommandContext;
use crate::plugins::docker_plugin::DOCKER;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct DockerPushRequest {
    pub image: String,
    pub target_repo: String,
}

#[derive(Debug)]
pub struct DockerPushSummary {
    /// Reference that was pushed, always carrying a tag or digest
    pub pushed: ImageReference,
    pub build_info: Option<BuildInfoRecord>,
}

pub struct DockerPushCommand {
    ctx: CommandContext,
}

impl DockerPushCommand {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, request: &DockerPushRequest) -> Result<DockerPushSummary, PublishError> {
        let reference = ImageReference::parse(&request.image)?;
        self.ctx.runner.ensure_available(DOCKER)?;

        self.ctx
            .transport
            .login(&reference)
            .await
            .map_err(|e| PublishError::LoginFailed {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        let pushed = reference.normalized();
        self.ctx
            .transport
            .push_image(&pushed)
            .await
            .map_err(|e| e.into_publish_error(format!("push {}", pushed)))?;
        tracing::info!(image = %pushed, "pushed image");

        let aggregator = self.ctx.aggregator();
        let Some(recorder) = aggregator.recorder() else {
            return Ok(DockerPushSummary {
                pushed,
                build_info: None,
            });
        };
        aggregator.begin().await?;

        let manifest = self
            .ctx
            .transport
            .image_manifest(&request.target_repo, &pushed)
            .await
            .map_err(|e| e.into_publish_error("manifest"))?;

        let mut layers = vec![manifest.config.clone()];
        layers.extend(manifest.layers.iter().cloned());
        let artifacts = self.layer_artifacts(&request.target_repo, &pushed, layers).await?;

        let module_id = pushed.to_string();
        recorder.record_artifacts(&module_id, artifacts);
        let manifest_json = serde_json::to_vec(&manifest)
            .map_err(|e| PublishError::BuildInfo(format!("Failed to encode manifest: {}", e)))?;
        recorder.record_artifacts(&module_id, vec![Artifact::from_bytes("manifest.json", &manifest_json)]);

        let build_info = aggregator.finalize().await?;
        Ok(DockerPushSummary { pushed, build_info })
    }

    /// Fetch details of every layer with at most `threads` requests in flight
    async fn layer_artifacts(
        &self,
        target_repo: &str,
        reference: &ImageReference,
        layers: Vec<ImageLayer>,
    ) -> Result<Vec<Artifact>, PublishError> {
        let semaphore = Arc::new(Semaphore::new(self.ctx.threads));
        let mut tasks = Vec::with_capacity(layers.len());

        for layer in layers {
            let semaphore = Arc::clone(&semaphore);
            let transport = Arc::clone(&self.ctx.transport);
            let target_repo = target_repo.to_string();
            let reference = reference.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PublishError::BuildInfo(e.to_string()))?;
                transport
                    .layer_details(&target_repo, &reference, &layer)
                    .await
                    .map_err(|e| e.into_publish_error(format!("layer {}", layer.digest)))
            });
            tasks.push(task);
        }

        // Join everything before reporting so no task outlives the command.
        let mut artifacts = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok(Ok(artifact)) => artifacts.push(artifact),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(PublishError::BuildInfo(format!(
                        "Layer task failed: {}",
                        e
                    )));
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(artifacts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransportError;
    use crate::core::traits::ImageManifest;
    use crate::orchestration::build_info::BuildProperties;
    use crate::testing::{MemoryBuildInfoStore, MockToolRunner, MockTransport};

    fn manifest() -> ImageManifest {
        ImageManifest {
            config: ImageLayer {
                digest: "sha256:cfg".to_string(),
                size: 10,
            },
            layers: (1..=5)
                .map(|i| ImageLayer {
                    digest: format!("sha256:l{}", i),
                    size: 100,
                })
                .collect(),
        }
    }

    fn command(
        transport: &Arc<MockTransport>,
        store: &Arc<MemoryBuildInfoStore>,
        build: BuildProperties,
    ) -> DockerPushCommand {
        command_with_runner(transport, store, build, Arc::new(MockToolRunner::new()))
    }

    fn command_with_runner(
        transport: &Arc<MockTransport>,
        store: &Arc<MemoryBuildInfoStore>,
        build: BuildProperties,
        runner: Arc<MockToolRunner>,
    ) -> DockerPushCommand {
        DockerPushCommand::new(
            CommandContext::new(transport.clone(), runner, store.clone())
                .with_build(build)
                .with_threads(2),
        )
    }

    fn layer_events(transport: &MockTransport) -> usize {
        transport
            .events()
            .iter()
            .filter(|e| e.starts_with("layer "))
            .count()
    }

    fn request(image: &str) -> DockerPushRequest {
        DockerPushRequest {
            image: image.to_string(),
            target_repo: "docker-local".to_string(),
        }
    }

    #[tokio::test]
    async fn test_push_appends_latest_after_login() {
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(MemoryBuildInfoStore::default());

        let summary = command(&transport, &store, BuildProperties::default())
            .run(&request("acme.io/team/app"))
            .await
            .unwrap();

        assert_eq!(summary.pushed.to_string(), "acme.io/team/app:latest");
        assert_eq!(
            transport.events(),
            vec!["login acme.io/team/app", "push acme.io/team/app:latest"]
        );
        assert!(summary.build_info.is_none());
        assert!(store.general_details().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_tag_is_kept() {
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(MemoryBuildInfoStore::default());

        let summary = command(&transport, &store, BuildProperties::default())
            .run(&request("myimage:1.0"))
            .await
            .unwrap();
        assert_eq!(summary.pushed.to_string(), "myimage:1.0");
    }

    #[tokio::test]
    async fn test_login_failure_aborts_before_push() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_login(TransportError::Unauthorized("bad credentials".to_string()));
        let store = Arc::new(MemoryBuildInfoStore::default());

        let err = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "LOGIN_FAILED");
        assert_eq!(transport.events(), vec!["login myimage"]);
        assert!(store.general_details().is_empty());
    }

    #[tokio::test]
    async fn test_build_info_records_all_layers_then_manifest() {
        let transport = Arc::new(MockTransport::default());
        transport.set_manifest(manifest());
        let store = Arc::new(MemoryBuildInfoStore::default());

        let summary = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage:2.0"))
            .await
            .unwrap();

        let record = summary.build_info.unwrap();
        assert_eq!(record.modules.len(), 1);
        assert_eq!(record.modules[0].id, "myimage:2.0");
        let names: Vec<&str> = record.modules[0]
            .artifacts
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names.len(), 7);
        assert_eq!(names.last(), Some(&"manifest.json"));
        assert!(names.contains(&"sha256__cfg"));
        assert_eq!(store.general_details().len(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_without_record() {
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(MemoryBuildInfoStore::default());

        let err = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert_eq!(store.general_details().len(), 1);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_missing_docker_fails_before_login() {
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(MemoryBuildInfoStore::default());
        let runner = Arc::new(MockToolRunner::new());
        runner.without_tool("docker");

        let err = command_with_runner(&transport, &store, BuildProperties::new("b", "1"), runner)
            .run(&request("myimage"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PREREQUISITE_MISSING");
        assert!(transport.events().is_empty());
        assert!(store.general_details().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_skips_build_info() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_push(TransportError::Rejected {
            status: 500,
            message: "blob upload failed".to_string(),
        });
        let store = Arc::new(MemoryBuildInfoStore::default());

        let err = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(err.to_string().contains("push myimage:latest"));
        assert_eq!(
            transport.events(),
            vec!["login myimage", "push myimage:latest"]
        );
        assert!(store.general_details().is_empty());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_layer_pool_is_bounded_by_threads() {
        let transport = Arc::new(MockTransport::default());
        let mut six_layers = manifest();
        six_layers.layers.push(ImageLayer {
            digest: "sha256:l6".to_string(),
            size: 100,
        });
        transport.set_manifest(six_layers);
        let store = Arc::new(MemoryBuildInfoStore::default());

        let summary = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage:3.0"))
            .await
            .unwrap();

        assert_eq!(layer_events(&transport), 7);
        assert_eq!(transport.max_layers_in_flight(), 2);
        assert_eq!(summary.build_info.unwrap().modules[0].artifacts.len(), 8);
    }

    #[tokio::test]
    async fn test_failing_layer_joins_all_tasks_and_saves_nothing() {
        let transport = Arc::new(MockTransport::default());
        transport.set_manifest(manifest());
        transport.fail_layer(
            "sha256:l3",
            TransportError::Rejected {
                status: 500,
                message: "storage unavailable".to_string(),
            },
        );
        let store = Arc::new(MemoryBuildInfoStore::default());

        let err = command(&transport, &store, BuildProperties::new("b", "1"))
            .run(&request("myimage:2.0"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(err.to_string().contains("layer sha256:l3"));
        assert_eq!(layer_events(&transport), 6);
        assert_eq!(store.general_details().len(), 1);
        assert!(store.records().is_empty());
    }
}
