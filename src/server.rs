//! Server (spec §2, §3): the top-level object tying together one Model
//! Manager per configured model, a Repository Watcher, and a Request
//! Mediator.
//!
//! Generalizes the teacher's `Server::new` -> `update_all_models()` shape: an
//! async constructor that runs one initial observe-and-dispatch pass over
//! every model, the same way the teacher brings every model into a known
//! state before `Server::new` returns rather than leaving the caller to race
//! the first `poll_model_repository()`. The dispatch itself is not awaited —
//! `handle_repository_event` hands each load/unload to a spawned task, so a
//! version can still be `LOADING` rather than `AVAILABLE` immediately after
//! construction; callers that need a settled state should give the
//! background task a chance to run first, exactly as every other caller of
//! `handle_repository_event` in this crate does.

use std::{collections::BTreeSet, sync::Arc};

use serde_json::Value;

use crate::{
    config::Config,
    engine::EngineLoader,
    error::Error,
    manager::ModelManager,
    mediator::{ModelMetadataResponse, RequestMediator},
    storage::{model_root, LocalFilesystemStorage, StorageAdapter},
    version::VersionStatus,
    watcher::RepositoryWatcher,
};

/// Owns every Model Manager configured for this process, plus the
/// background watcher and the mediator built on top of them.
pub struct Server {
    managers: Vec<Arc<ModelManager>>,
    mediator: Arc<RequestMediator>,
    watcher_handle: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("models", &self.model_names()).finish_non_exhaustive()
    }
}

impl Server {
    /// Build a Server for every model name in `config.models`, all loaded
    /// through `loader` and backed by the local filesystem (spec §1: the
    /// inference runtime and its loader are external collaborators supplied
    /// by the embedding application).
    pub async fn new(config: Config, loader: Arc<dyn EngineLoader>) -> Result<Self, Error> {
        Self::with_storage(config, loader, Arc::new(LocalFilesystemStorage::new())).await
    }

    /// As [`Server::new`], but with an explicit [`StorageAdapter`] — the
    /// seam a non-filesystem backend (or a test fixture) plugs into.
    pub async fn with_storage(
        config: Config,
        loader: Arc<dyn EngineLoader>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, Error> {
        if config.models.is_empty() {
            return Err(Error::invalid_input("no models configured"));
        }

        let mut managers = Vec::with_capacity(config.models.len());
        for name in &config.models {
            let root = model_root(&config.repository_root, name);
            let manager = ModelManager::new(
                name.clone(),
                root,
                config.policy_for(name),
                storage.clone(),
                loader.clone(),
            );

            let observed: BTreeSet<u64> = manager.storage().list_versions(manager.root()).await?;
            manager.handle_repository_event(observed).await;
            managers.push(manager);
        }

        let watcher = RepositoryWatcher::new(
            config.repository_root.clone(),
            managers.clone(),
            config.tick_interval,
        );
        let watcher_handle = watcher.spawn();

        let mediator = Arc::new(RequestMediator::new(managers.clone()));

        Ok(Server {
            managers,
            mediator,
            watcher_handle,
        })
    }

    /// The names of every model this Server owns.
    pub fn model_names(&self) -> Vec<&str> {
        self.managers.iter().map(|m| m.name()).collect()
    }

    /// Shared handle to the mediator, for embedding into a listener this
    /// crate doesn't own (e.g. a caller-managed `axum::serve` loop).
    pub fn mediator(&self) -> Arc<RequestMediator> {
        self.mediator.clone()
    }

    pub async fn get_model_status(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
    ) -> Result<Vec<VersionStatus>, Error> {
        self.mediator.get_model_status(model_name, requested_version).await
    }

    pub async fn get_model_metadata(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
    ) -> Result<ModelMetadataResponse, Error> {
        self.mediator.get_model_metadata(model_name, requested_version).await
    }

    pub async fn predict(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
        body: Value,
    ) -> Result<Value, Error> {
        self.mediator.predict(model_name, requested_version, body, None).await
    }

    /// Manually trigger a FAILED -> LOADING retry for one model's version.
    pub async fn retry_version(&self, model_name: &str, version: u64) -> Result<(), Error> {
        self.managers
            .iter()
            .find(|m| m.name() == model_name)
            .ok_or_else(|| Error::not_found(format!("model '{model_name}' is not known to this server")))?
            .retry_version(version)
            .await
    }

    #[cfg(feature = "http")]
    pub fn http_router(&self) -> axum::Router {
        crate::http::build_router(self.mediator.clone())
    }

    #[cfg(feature = "rpc")]
    pub fn rpc_service(&self) -> crate::rpc::RpcService {
        crate::rpc::RpcService::new(self.mediator.clone())
    }

    /// Stop the background Repository Watcher. Dropping a `Server` does not
    /// do this implicitly — mirrors the teacher's explicit `stop()`.
    pub fn stop(&self) {
        self.watcher_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GlobalConfig,
        engine::InferenceRuntime,
        error::ErrorCode,
        policy::PolicyConfig,
        tensor::{ModelKeys, NamedTensors, TensorDescriptor},
        version::VersionState,
    };
    use async_trait::async_trait;
    use std::{collections::HashMap, path::Path, time::Duration};

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

    fn config(repository_root: std::path::PathBuf) -> Config {
        let mut cfg = Config::new(GlobalConfig {
            repository_root: repository_root.display().to_string(),
            tick_interval_ms: 1000,
            http_addr: "0.0.0.0:8501".to_string(),
            rpc_addr: "0.0.0.0:8500".to_string(),
            models: vec!["resnet".to_string()],
        });
        cfg.with_default_policy(PolicyConfig::Latest(1));
        cfg
    }

    #[tokio::test]
    async fn discovers_existing_versions_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resnet").join("1")).unwrap();

        let server = Server::new(config(dir.path().to_path_buf()), Arc::new(StubLoader))
            .await
            .unwrap();
        assert_eq!(server.model_names(), vec!["resnet"]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let statuses = server.get_model_status("resnet", None).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, VersionState::Available);

        server.stop();
    }

    #[tokio::test]
    async fn predict_round_trips_through_full_stack() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resnet").join("1")).unwrap();

        let server = Server::new(config(dir.path().to_path_buf()), Arc::new(StubLoader))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let body = serde_json::json!({"inputs": [1.0, 2.0]});
        let response = server.predict("resnet", None, body).await.unwrap();
        assert_eq!(response, serde_json::json!({"outputs": [1.0, 2.0]}));

        server.stop();
    }

    #[tokio::test]
    async fn no_models_configured_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path().to_path_buf());
        cfg.models.clear();
        let err = Server::new(cfg, Arc::new(StubLoader)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn retry_version_reaches_unknown_model_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resnet").join("1")).unwrap();
        let server = Server::new(config(dir.path().to_path_buf()), Arc::new(StubLoader))
            .await
            .unwrap();
        let err = server.retry_version("ghost", 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        server.stop();
    }
}
