//! # **Serve ML models with a TensorFlow-Serving-shaped frontend**
//!
//! This crate is a model-version lifecycle engine and serving envelope for
//! ML inference frontends. It watches a model repository on disk, decides
//! which versions of each model should be loaded according to a per-model
//! policy, and answers status/metadata/predict requests against whatever is
//! currently available — all while the actual inference runtime (PyTorch,
//! ONNX, TensorFlow, or anything else) stays an external collaborator you
//! plug in through [`engine::EngineLoader`].
//!
//! ---
//!
//! # Usage
//!
//! Run inference in three simple steps:
//!
//! ## **Step 1. Prepare the model repository**
//!
//! Organize your model files in the following structure:
//!
//! ```text
//! models/
//! ├── yolov8/
//! |    ├── 1/
//! |    │   └── model.onnx
//! |    ├── 2/
//! |    │   └── model.onnx
//! |    └── `<other versions of yolov8>`/
//! └── `<other models>`/
//! ```
//!
//! **Rules**:
//! - All models live under the same repository root (`models/` above).
//! - Each model has its own directory; each immediate child directory whose
//!   name parses as a positive integer is a version of that model.
//!
//! ---
//!
//! ## **Step 2. Write the code**
//!
//! ```rust,ignore
//! use modelserve_rs::{config::Config, server::Server};
//! use std::sync::Arc;
//!
//! let mut config = Config::from_env()?;
//! config.models = vec!["yolov8".to_string()];
//!
//! // `MyLoader` implements `engine::EngineLoader` against your runtime of choice.
//! let server = Server::new(config, Arc::new(MyLoader)).await?;
//!
//! let response = server
//!     .predict("yolov8", None, serde_json::json!({"instances": [[1.0, 2.0]]}))
//!     .await?;
//! ```
//!
//! ---
//!
//! ## **Step 3. Serve it over HTTP and/or the binary RPC surface**
//!
//! With the default `http`/`rpc` features enabled:
//!
//! ```rust,ignore
//! let app = server.http_router();
//! let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ---
//!
//! # **Advantages of the Crate**
//!
//! - **Runtime-agnostic**: bring your own inference backend through one
//!   trait; this crate owns only version lifecycle and request routing.
//! - **Multi-model, multi-version**: serve several models simultaneously,
//!   each with several concurrently-available versions.
//! - **Configurable retention policy**: `LATEST(n)`, `SPECIFIC(set)`, or
//!   `ALL` per model.
//! - **Safe hot-swap**: in-flight requests finish against the engine they
//!   acquired even while a newer version is loading or an older one drains.
//! - **TensorFlow-Serving-shaped wire surface**: both the REST and binary
//!   RPC envelopes mirror TF Serving's own request/response shapes.

pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "http")]
/// HTTP/JSON serving surface (spec-shaped like TensorFlow Serving's REST API).
pub mod http;
pub mod format;
pub mod manager;
pub mod mediator;
pub mod policy;
#[cfg(feature = "rpc")]
/// Binary RPC serving surface (spec-shaped like TensorFlow Serving's gRPC API).
pub mod rpc;
/// Server initialization and lifecycle management.
pub mod server;
pub mod storage;
pub mod tensor;
pub mod version;
pub mod watcher;

pub use crate::{
    config::Config,
    error::{Error, ErrorCode},
    server::Server,
};
