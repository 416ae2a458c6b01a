//! Repository Watcher (spec §4.6, C6): periodically rescans a model's
//! directory tree and feeds the observed version set to its Model Manager.

use std::{sync::Arc, time::Duration};

use crate::{manager::ModelManager, storage::model_root};

/// Ticks every model under one repository root on a fixed interval. This
/// generalizes the teacher's `Server::poll_model_repository` — there the
/// caller triggers one rescan on demand; here the crate owns a recurring
/// background tick instead, since there's no external caller to poll it.
pub struct RepositoryWatcher {
    repository_root: std::path::PathBuf,
    managers: Vec<Arc<ModelManager>>,
    tick_interval: Duration,
}

impl RepositoryWatcher {
    pub fn new(
        repository_root: std::path::PathBuf,
        managers: Vec<Arc<ModelManager>>,
        tick_interval: Duration,
    ) -> Self {
        RepositoryWatcher {
            repository_root,
            managers,
            tick_interval,
        }
    }

    /// Spawn the periodic scan as a background task and return its handle.
    /// Dropping the handle does not stop the task; callers that need a
    /// clean shutdown should keep it and `abort()` explicitly.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// Run exactly one scan-and-reconcile pass across every managed model.
    /// Exposed directly so tests (and a manual "rescan now" trigger) don't
    /// have to wait on the interval.
    pub async fn tick(&self) {
        for manager in &self.managers {
            let root = model_root(&self.repository_root, manager.name());
            match manager.storage().list_versions(&root).await {
                Ok(observed) => manager.handle_repository_event(observed).await,
                Err(err) => {
                    // A storage error this tick must not mutate any Version
                    // Record (spec §4.6): skip and retry on the next tick.
                    log::warn!(
                        "watcher: failed to list versions for model '{}': {err}",
                        manager.name()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{EngineLoader, InferenceRuntime},
        error::Error,
        policy::PolicyConfig,
        storage::LocalFilesystemStorage,
        tensor::{ModelKeys, NamedTensors, TensorDescriptor},
        version::VersionState,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;

    struct StubRuntime;

    #[async_trait]
    impl InferenceRuntime for StubRuntime {
        fn input_tensors(&self) -> &HashMap<String, TensorDescriptor> {
            static EMPTY: std::sync::OnceLock<HashMap<String, TensorDescriptor>> = std::sync::OnceLock::new();
            EMPTY.get_or_init(HashMap::new)
        }
        fn output_tensors(&self) -> &HashMap<String, TensorDescriptor> {
            self.input_tensors()
        }
        fn model_keys(&self) -> &ModelKeys {
            static KEYS: std::sync::OnceLock<ModelKeys> = std::sync::OnceLock::new();
            KEYS.get_or_init(ModelKeys::default)
        }
        async fn infer(&self, named_tensors: NamedTensors, _batch_size: usize) -> Result<NamedTensors, Error> {
            Ok(named_tensors)
        }
    }

    struct StubLoader;

    #[async_trait]
    impl EngineLoader for StubLoader {
        async fn load(&self, _dir: &Path) -> Result<Box<dyn InferenceRuntime>, Error> {
            Ok(Box::new(StubRuntime))
        }
    }

    #[tokio::test]
    async fn tick_picks_up_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resnet").join("1")).unwrap();

        let manager = ModelManager::new(
            "resnet",
            model_root(dir.path(), "resnet"),
            PolicyConfig::Latest(1),
            Arc::new(LocalFilesystemStorage::new()),
            Arc::new(StubLoader),
        );
        let watcher = RepositoryWatcher::new(
            dir.path().to_path_buf(),
            vec![manager.clone()],
            Duration::from_secs(1),
        );

        watcher.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let statuses = manager.list_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, VersionState::Available);

        std::fs::create_dir_all(dir.path().join("resnet").join("2")).unwrap();
        watcher.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        watcher.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let statuses = manager.list_statuses().await;
        let v1 = statuses.iter().find(|s| s.version == 1).unwrap();
        let v2 = statuses.iter().find(|s| s.version == 2).unwrap();
        assert_eq!(v1.state, VersionState::End);
        assert_eq!(v2.state, VersionState::Available);
    }

    #[tokio::test]
    async fn missing_model_root_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(
            "ghost",
            model_root(dir.path(), "ghost"),
            PolicyConfig::All,
            Arc::new(LocalFilesystemStorage::new()),
            Arc::new(StubLoader),
        );
        let watcher = RepositoryWatcher::new(
            dir.path().to_path_buf(),
            vec![manager.clone()],
            Duration::from_secs(1),
        );
        watcher.tick().await;
        assert!(manager.list_statuses().await.is_empty());
    }
}
