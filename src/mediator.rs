//! Request Mediator (spec §4.7, C7): resolves (model, version), acquires an
//! engine under the concurrency guard, invokes it, releases, translates
//! errors. Grounded on `rest_service.py`'s three Falcon resources
//! (`GetModelStatus`/`GetModelMetadata`/`Predict`), generalized away from a
//! specific wire format so both the HTTP and RPC surfaces can share it.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;

use crate::{
    engine::EngineHandle,
    error::Error,
    format::{body_to_named_tensors, detect_format, named_tensors_to_response},
    manager::{ModelManager, VersionSelector},
    tensor::TensorDescriptor,
    version::VersionStatus,
};

/// `requested_version | LATEST`, as accepted at the wire boundary (spec
/// §4.7: every request kind takes this plus a payload).
#[derive(Debug, Clone, Copy)]
pub enum RequestedVersion {
    Specific(u64),
    Latest,
}

impl From<Option<u64>> for RequestedVersion {
    fn from(version: Option<u64>) -> Self {
        match version {
            Some(v) => RequestedVersion::Specific(v),
            None => RequestedVersion::Latest,
        }
    }
}

impl From<RequestedVersion> for VersionSelector {
    fn from(version: RequestedVersion) -> Self {
        match version {
            RequestedVersion::Specific(v) => VersionSelector::Specific(v),
            RequestedVersion::Latest => VersionSelector::Latest,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadataResponse {
    pub model_name: String,
    pub version: u64,
    pub inputs: HashMap<String, TensorDescriptor>,
    pub outputs: HashMap<String, TensorDescriptor>,
}

/// Releases an acquired engine on every exit path — including an early
/// return from `?` mid-`infer` — per spec §4.7's "ensure release runs on
/// every exit path" requirement. This is the Rust-native replacement for
/// the source's manual `try`/`except`/`finally`-shaped acquire/release.
struct ReleaseGuard(Arc<EngineHandle>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Dispatches predict/metadata/status requests across every managed model.
pub struct RequestMediator {
    managers: HashMap<String, Arc<ModelManager>>,
}

impl RequestMediator {
    pub fn new(managers: impl IntoIterator<Item = Arc<ModelManager>>) -> Self {
        RequestMediator {
            managers: managers.into_iter().map(|m| (m.name().to_string(), m)).collect(),
        }
    }

    fn manager(&self, model_name: &str) -> Result<&Arc<ModelManager>, Error> {
        self.managers
            .get(model_name)
            .ok_or_else(|| Error::not_found(format!("model '{model_name}' is not known to this server")))
    }

    /// GetModelStatus (spec §4.7): no engine acquisition.
    pub async fn get_model_status(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
    ) -> Result<Vec<VersionStatus>, Error> {
        let manager = self.manager(model_name)?;
        match requested_version {
            Some(version) => manager
                .status_of(version)
                .await
                .map(|status| vec![status])
                .ok_or_else(|| {
                    Error::not_found(format!("model '{model_name}' has no record for version {version}"))
                }),
            None => Ok(manager.list_statuses().await),
        }
    }

    /// GetModelMetadata (spec §4.7): resolve -> acquire -> read -> release.
    pub async fn get_model_metadata(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
    ) -> Result<ModelMetadataResponse, Error> {
        let manager = self.manager(model_name)?;
        let (version, engine) = manager.resolve(RequestedVersion::from(requested_version).into()).await?;
        let _guard = ReleaseGuard(engine.clone());
        let (inputs, outputs, _keys) = engine.metadata();
        Ok(ModelMetadataResponse {
            model_name: model_name.to_string(),
            version,
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        })
    }

    /// Predict (spec §4.7, §6): parse -> resolve -> acquire -> infer ->
    /// release -> serialize. `deadline` is the optional per-request
    /// deadline from spec §5 Cancellation & timeouts.
    pub async fn predict(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
        body: Value,
        deadline: Option<Duration>,
    ) -> Result<Value, Error> {
        let format = detect_format(&body)?;
        let manager = self.manager(model_name)?;
        let (_version, engine) = manager.resolve(RequestedVersion::from(requested_version).into()).await?;
        let _guard = ReleaseGuard(engine.clone());

        let (input_tensors, _, model_keys) = engine.metadata();
        // Client-facing names come from `model_keys.inputs` when the model
        // renames them; an empty map means the client uses the runtime's
        // own tensor names unchanged.
        let input_names: Vec<String> = if model_keys.inputs.is_empty() {
            input_tensors.keys().cloned().collect()
        } else {
            model_keys.inputs.keys().cloned().collect()
        };
        let named_tensors = body_to_named_tensors(&body, format, &input_names)?;

        let outputs = Self::infer_with_deadline(&engine, named_tensors, deadline).await?;
        Ok(named_tensors_to_response(&outputs, format))
    }

    /// Predict entry point for the binary RPC surface (spec §6), which
    /// carries already-named tensors and has no row/column ambiguity to
    /// resolve: resolve -> acquire -> infer -> release, no JSON framing.
    pub async fn infer_named(
        &self,
        model_name: &str,
        requested_version: Option<u64>,
        named_tensors: crate::tensor::NamedTensors,
        deadline: Option<Duration>,
    ) -> Result<crate::tensor::NamedTensors, Error> {
        let manager = self.manager(model_name)?;
        let (_version, engine) = manager.resolve(RequestedVersion::from(requested_version).into()).await?;
        let _guard = ReleaseGuard(engine.clone());
        Self::infer_with_deadline(&engine, named_tensors, deadline).await
    }

    async fn infer_with_deadline(
        engine: &EngineHandle,
        named_tensors: crate::tensor::NamedTensors,
        deadline: Option<Duration>,
    ) -> Result<crate::tensor::NamedTensors, Error> {
        let batch_size = named_tensors
            .values()
            .next()
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(1);
        let result = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, engine.infer(named_tensors, batch_size)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(Error::new(
                        crate::error::ErrorCode::DeadlineExceeded,
                        "inference deadline exceeded",
                    ))
                }
            },
            None => engine.infer(named_tensors, batch_size).await,
        };
        result.map_err(normalize_infer_error)
    }
}

/// The source's `except ValueError` handler around the inference call
/// surfaces as a fixed 400 body regardless of the underlying message (spec
/// §3): `engine.infer()`'s own shape-mismatch text and whatever the runtime
/// itself raises as `InvalidInput` both collapse to this literal before
/// reaching the wire. Format-level rejections (`detect_format`,
/// `body_to_named_tensors`) happen earlier and keep their own messages —
/// only errors from the inference call itself are normalized here.
fn normalize_infer_error(err: Error) -> Error {
    if err.code() == crate::error::ErrorCode::InvalidInput {
        Error::invalid_input("Malformed input data")
    } else {
        err
    }
}
