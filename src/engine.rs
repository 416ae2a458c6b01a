//! Engine Handle (spec §4.3, C3): wraps one loaded model version, exposing
//! metadata and `infer`, and mediates concurrent access via an in-use
//! counter with a drain condition.

use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    error::{Error, ErrorCode},
    tensor::{ModelKeys, NamedTensors, TensorDescriptor},
};

/// The inference runtime itself is an external collaborator (spec §1): it
/// loads a model artifact from a directory and answers `infer`/metadata
/// queries. Implementers own their own batching, device placement and
/// internal serialization, if any.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    fn input_tensors(&self) -> &HashMap<String, TensorDescriptor>;
    fn output_tensors(&self) -> &HashMap<String, TensorDescriptor>;
    fn model_keys(&self) -> &ModelKeys;

    /// Execute inference. Implementers return [`ErrorCode::InvalidInput`]
    /// for malformed/mismatched tensors the runtime itself detects, and
    /// [`ErrorCode::Internal`] for anything else (spec §4.3).
    async fn infer(&self, named_tensors: NamedTensors, batch_size: usize) -> Result<NamedTensors, Error>;
}

/// Loads an [`InferenceRuntime`] from a version directory (spec §3: "The
/// engine is created by loading from a directory"). Supplied by the
/// embedding application; this crate only calls it from the Model Manager.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, version_dir: &Path) -> Result<Box<dyn InferenceRuntime>, Error>;
}

/// One loaded, in-memory realization of a model version (spec §3).
///
/// Descriptors are immutable once constructed. The in-use counter and its
/// drain [`Notify`] are the concurrency guard the Model Manager and Request
/// Mediator rely on to make unload safe (spec §5).
pub struct EngineHandle {
    runtime: Box<dyn InferenceRuntime>,
    in_use: AtomicI64,
    drained: Notify,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("in_use", &self.in_use_count())
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    pub fn new(runtime: Box<dyn InferenceRuntime>) -> Self {
        EngineHandle {
            runtime,
            in_use: AtomicI64::new(0),
            drained: Notify::new(),
        }
    }

    /// O(1), never fails once constructed.
    pub fn metadata(&self) -> (&HashMap<String, TensorDescriptor>, &HashMap<String, TensorDescriptor>, &ModelKeys) {
        (
            self.runtime.input_tensors(),
            self.runtime.output_tensors(),
            self.runtime.model_keys(),
        )
    }

    /// Increment the in-use counter. Callers must have already verified
    /// under the Model Manager's lock that the owning Version Record is
    /// `AVAILABLE` — `acquire` itself performs no state check.
    pub fn acquire(&self) {
        self.in_use.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the in-use counter; wakes an unload waiter once it reaches
    /// zero.
    pub fn release(&self) {
        let previous = self.in_use.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "release() without matching acquire()");
        if previous == 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn in_use_count(&self) -> i64 {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Wait until the in-use counter reaches zero. Since new acquisitions
    /// are refused at the manager once the version leaves `AVAILABLE`, the
    /// counter is monotonically non-increasing while this is awaited
    /// (spec §5 Unload safety).
    pub async fn wait_drained(&self) {
        loop {
            // Register interest before checking the counter so a release()
            // that lands between the check and the await can't be missed.
            let notified = self.drained.notified();
            if self.in_use_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Run inference, translating shape mismatches the handle itself can
    /// detect into `INVALID_INPUT` before delegating to the runtime.
    pub async fn infer(&self, named_tensors: NamedTensors, batch_size: usize) -> Result<NamedTensors, Error> {
        for (name, value) in &named_tensors {
            let internal_name = self
                .runtime
                .model_keys()
                .inputs
                .get(name)
                .map(String::as_str)
                .unwrap_or(name.as_str());
            if let Some(descriptor) = self.runtime.input_tensors().get(internal_name) {
                let dims = crate::tensor::infer_json_shape(value);
                if !dims.is_empty() && !descriptor.accepts_shape(&dims) {
                    return Err(Error::new(
                        ErrorCode::InvalidInput,
                        format!(
                            "input '{name}' has shape {dims:?}, expected {:?}",
                            descriptor.shape
                        ),
                    ));
                }
            }
        }
        self.runtime.infer(named_tensors, batch_size).await
    }
}
