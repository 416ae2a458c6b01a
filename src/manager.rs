//! Model Manager (spec §4.5, C5): one per model name, owns the version map,
//! drives state transitions, loads/unloads engines, answers queries.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    engine::{EngineHandle, EngineLoader},
    error::{Error, ErrorCode},
    policy::{decide, PolicyConfig},
    storage::StorageAdapter,
    version::{VersionRecord, VersionState, VersionStatus},
};

/// Which version a caller wants from [`ModelManager::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Specific(u64),
    Latest,
}

/// Owns the version map for one model name (spec §3 Model, §4.5).
pub struct ModelManager {
    name: String,
    root: PathBuf,
    policy: PolicyConfig,
    storage: Arc<dyn StorageAdapter>,
    loader: Arc<dyn EngineLoader>,
    versions: Mutex<BTreeMap<u64, VersionRecord>>,
}

impl ModelManager {
    pub fn new(
        name: impl Into<String>,
        root: PathBuf,
        policy: PolicyConfig,
        storage: Arc<dyn StorageAdapter>,
        loader: Arc<dyn EngineLoader>,
    ) -> Arc<Self> {
        Arc::new(ModelManager {
            name: name.into(),
            root,
            policy,
            storage,
            loader,
            versions: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// `resolve(requested_version | LATEST)` (spec §4.5). On success the
    /// returned engine already has `acquire()` applied; the caller must
    /// `release()` it.
    pub async fn resolve(&self, selector: VersionSelector) -> Result<(u64, Arc<EngineHandle>), Error> {
        let versions = self.versions.lock().await;
        let record = match selector {
            VersionSelector::Specific(v) => versions.get(&v).ok_or_else(|| {
                Error::not_found(format!(
                    "model '{}' has no record for version {v}",
                    self.name
                ))
            })?,
            VersionSelector::Latest => versions
                .values()
                .filter(|r| r.state == VersionState::Available)
                .max_by_key(|r| r.version)
                .ok_or_else(|| {
                    Error::not_found(format!("model '{}' has no available version", self.name))
                })?,
        };

        if record.state != VersionState::Available {
            return Err(Error::not_found(format!(
                "model '{}' version {} is not available ({:?})",
                self.name, record.version, record.state
            )));
        }
        let engine = record
            .engine
            .clone()
            .expect("invariant 2: AVAILABLE records always carry an engine");
        engine.acquire();
        Ok((record.version, engine))
    }

    /// Lock-free-to-callers snapshot of every tracked Version Record (spec
    /// §4.5). Internally this takes the manager's mutex only long enough to
    /// clone the small per-version summaries.
    pub async fn list_statuses(&self) -> Vec<VersionStatus> {
        let versions = self.versions.lock().await;
        versions.values().map(VersionRecord::status).collect()
    }

    pub async fn status_of(&self, version: u64) -> Option<VersionStatus> {
        let versions = self.versions.lock().await;
        versions.get(&version).map(VersionRecord::status)
    }

    /// Entry point from the Repository Watcher (spec §4.5). Must be called
    /// with the full observed version set for this model on every tick, even
    /// when it's unchanged.
    pub async fn handle_repository_event(self: &Arc<Self>, observed: std::collections::BTreeSet<u64>) {
        let mut versions = self.versions.lock().await;

        // Invariant 4: a Version Record that reached END on a prior tick and
        // has stayed absent from disk for a full tick is destroyed here. If
        // it reappeared in `observed` while still END in the map (the
        // reappear-same-tick edge case), it is replaced by a fresh record
        // starting at DISCOVERED rather than resurrected.
        versions.retain(|v, r| !(r.state == VersionState::End && !observed.contains(v)));
        for v in &observed {
            if versions.get(v).map(|r| r.state) == Some(VersionState::End) {
                versions.insert(*v, VersionRecord::discovered(*v));
            }
        }

        // Every observed version gets at least a DISCOVERED record, even if
        // the policy doesn't intend to serve it.
        for v in &observed {
            versions.entry(*v).or_insert_with(|| VersionRecord::discovered(*v));
        }

        // FAILED counts as "loaded" for policy purposes so a version whose
        // load previously failed is not retried on every tick (Open Question
        // 3); it is still retired if the policy stops wanting it.
        let loaded_or_failed: std::collections::BTreeSet<u64> = versions
            .iter()
            .filter(|(_, r)| {
                matches!(
                    r.state,
                    VersionState::Loading | VersionState::Available | VersionState::Failed
                )
            })
            .map(|(&v, _)| v)
            .collect();

        let decision = decide(&observed, &loaded_or_failed, &self.policy);

        for v in &decision.to_load {
            if let Some(record) = versions.get_mut(v) {
                if record.state == VersionState::Discovered {
                    record.transition(VersionState::Loading, ErrorCode::Ok, None);
                    self.spawn_load_task(*v);
                }
                // LOADING/UNLOADING records in to_load are left alone; they
                // resolve themselves by the next tick (spec §4.5 ordering
                // note: externally observable state changes atomically,
                // bounded to one watcher tick of lag).
            }
        }

        for v in &decision.to_unload {
            if let Some(record) = versions.get_mut(v) {
                match record.state {
                    VersionState::Available => {
                        let engine = record.engine.clone();
                        record.transition(VersionState::Unloading, ErrorCode::Ok, engine.clone());
                        self.spawn_unload_task(*v, engine.expect("AVAILABLE implies engine"));
                    }
                    VersionState::Failed => {
                        record.transition(VersionState::End, ErrorCode::Ok, None);
                    }
                    _ => {}
                }
            }
        }

        // Versions the watcher no longer observes but the policy never
        // touched (e.g. DISCOVERED-only under SPECIFIC/LATEST) are retired
        // directly, since they never had an engine to drain.
        let vanished_discovered: Vec<u64> = versions
            .iter()
            .filter(|(v, r)| r.state == VersionState::Discovered && !observed.contains(v))
            .map(|(&v, _)| v)
            .collect();
        for v in vanished_discovered {
            if let Some(record) = versions.get_mut(&v) {
                record.transition(VersionState::End, ErrorCode::Ok, None);
            }
        }
    }

    /// Manually trigger a FAILED -> LOADING retry (Open Question 3: the
    /// state machine permits this but nothing in the crate calls it on a
    /// schedule).
    pub async fn retry_version(self: &Arc<Self>, version: u64) -> Result<(), Error> {
        let mut versions = self.versions.lock().await;
        let record = versions
            .get_mut(&version)
            .ok_or_else(|| Error::not_found(format!("no record for version {version}")))?;
        if record.state != VersionState::Failed {
            return Err(Error::invalid_input(format!(
                "version {version} is not FAILED (currently {:?})",
                record.state
            )));
        }
        record.transition(VersionState::Loading, ErrorCode::Ok, None);
        drop(versions);
        self.spawn_load_task(version);
        Ok(())
    }

    fn spawn_load_task(self: &Arc<Self>, version: u64) {
        let manager = self.clone();
        let loader = self.loader.clone();
        let version_dir = self.root.join(version.to_string());
        tokio::spawn(async move {
            log::debug!("model '{}' version {version}: loading", manager.name);
            let result = loader.load(&version_dir).await;

            let mut versions = manager.versions.lock().await;
            // Discarded if the version is already retired by the time the
            // load commits (spec §5 Cancellation & timeouts).
            let Some(record) = versions.get_mut(&version) else {
                log::debug!("model '{}' version {version}: retired before load committed", manager.name);
                return;
            };
            if record.state != VersionState::Loading {
                return;
            }
            match result {
                Ok(runtime) => {
                    let engine = Arc::new(EngineHandle::new(runtime));
                    record.transition(VersionState::Available, ErrorCode::Ok, Some(engine));
                    log::info!("model '{}' version {version}: available", manager.name);
                }
                Err(err) => {
                    log::warn!("model '{}' version {version}: load failed: {err}", manager.name);
                    record.transition(VersionState::Failed, ErrorCode::LoadFailed, None);
                }
            }
        });
    }

    fn spawn_unload_task(self: &Arc<Self>, version: u64, engine: Arc<EngineHandle>) {
        let manager = self.clone();
        tokio::spawn(async move {
            engine.wait_drained().await;
            let mut versions = manager.versions.lock().await;
            if let Some(record) = versions.get_mut(&version) {
                if record.state == VersionState::Unloading {
                    record.transition(VersionState::End, ErrorCode::Ok, None);
                    log::info!("model '{}' version {version}: unloaded", manager.name);
                }
            }
        });
    }
}
