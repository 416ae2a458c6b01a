//! Binary RPC surface (spec §6): message schemas mirroring TensorFlow
//! Serving's own protobuf shapes closely enough that the field names tests
//! seed (`model_spec.name`, `model_spec.version.value`,
//! `model_version_status[].version/state/status.error_code/error_message`,
//! a `signature_def` map keyed solely by `"serving_default"`) line up.
//! Framing is `bincode` rather than protobuf — the teacher has no
//! non-gRPC binary codec of its own, so this is enriched from the pack's
//! common wire-format choice.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, ErrorCode},
    mediator::RequestMediator,
    tensor::{NamedTensors, TensorDescriptor},
    version::{VersionState, VersionStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub version: ModelVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionStatusBody {
    pub error_code: ErrorCode,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionStatus {
    pub version: u64,
    pub state: VersionState,
    pub status: ModelVersionStatusBody,
}

impl From<&VersionStatus> for ModelVersionStatus {
    fn from(status: &VersionStatus) -> Self {
        ModelVersionStatus {
            version: status.version,
            state: status.state,
            status: ModelVersionStatusBody {
                error_code: status.error_code,
                error_message: status.error_message.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModelStatusRequest {
    pub model_spec: ModelSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModelStatusResponse {
    pub model_version_status: Vec<ModelVersionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDef {
    pub inputs: HashMap<String, TensorDescriptor>,
    pub outputs: HashMap<String, TensorDescriptor>,
}

/// A map with exactly one entry, keyed `"serving_default"` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDefMap {
    pub signature_def: HashMap<String, SignatureDef>,
}

impl SignatureDefMap {
    fn serving_default(def: SignatureDef) -> Self {
        let mut signature_def = HashMap::with_capacity(1);
        signature_def.insert("serving_default".to_string(), def);
        SignatureDefMap { signature_def }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModelMetadataRequest {
    pub model_spec: ModelSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModelMetadataResponse {
    pub model_spec: ModelSpec,
    pub metadata: HashMap<String, SignatureDefMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub model_spec: ModelSpec,
    pub inputs: NamedTensors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_spec: ModelSpec,
    pub outputs: NamedTensors,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    bincode::serialize(value).map_err(|err| Error::internal(format!("rpc encode failed: {err}")))
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, Error> {
    bincode::deserialize(bytes).map_err(|err| Error::invalid_input(format!("rpc decode failed: {err}")))
}

/// Thin framing layer over [`RequestMediator`] for the three RPC methods
/// (spec §6: `Predict`, `GetModelMetadata`, `GetModelStatus`).
pub struct RpcService {
    mediator: std::sync::Arc<RequestMediator>,
}

impl RpcService {
    pub fn new(mediator: std::sync::Arc<RequestMediator>) -> Self {
        RpcService { mediator }
    }

    pub async fn get_model_status(&self, request_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let request: GetModelStatusRequest = decode(request_bytes)?;
        let requested_version = (request.model_spec.version.value != 0).then_some(request.model_spec.version.value);
        let statuses = self
            .mediator
            .get_model_status(&request.model_spec.name, requested_version)
            .await?;
        encode(&GetModelStatusResponse {
            model_version_status: statuses.iter().map(ModelVersionStatus::from).collect(),
        })
    }

    pub async fn get_model_metadata(&self, request_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let request: GetModelMetadataRequest = decode(request_bytes)?;
        let requested_version = (request.model_spec.version.value != 0).then_some(request.model_spec.version.value);
        let metadata = self
            .mediator
            .get_model_metadata(&request.model_spec.name, requested_version)
            .await?;
        let signature = SignatureDefMap::serving_default(SignatureDef {
            inputs: metadata.inputs,
            outputs: metadata.outputs,
        });
        let mut metadata_map = HashMap::with_capacity(1);
        metadata_map.insert("signature_def".to_string(), signature);
        encode(&GetModelMetadataResponse {
            model_spec: ModelSpec {
                name: metadata.model_name,
                version: ModelVersion { value: metadata.version },
            },
            metadata: metadata_map,
        })
    }

    pub async fn predict(&self, request_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let request: PredictRequest = decode(request_bytes)?;
        let requested_version = (request.model_spec.version.value != 0).then_some(request.model_spec.version.value);
        let outputs = self
            .mediator
            .infer_named(&request.model_spec.name, requested_version, request.inputs, None)
            .await?;
        encode(&PredictResponse {
            model_spec: request.model_spec,
            outputs,
        })
    }
}
