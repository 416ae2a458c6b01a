//! Process configuration (ambient stack, not named in spec.md): the model
//! repository root, watcher tick interval, wire addresses, and per-model
//! policy overrides.
//!
//! Global, flat settings are parsed from CLI/env via `config-manager`, the
//! same crate and `#[config]`/`ConfigInit::parse()` pattern the teacher's
//! own example binaries use. Per-model policy overrides don't fit a flat
//! CLI struct (spec §3's Policy Config is per-model), so they're layered on
//! afterward with the teacher's `Options`-style chained `&mut Self` setters.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use config_manager::{config, ConfigInit};

use crate::{error::Error, policy::PolicyConfig};

#[derive(Debug, Clone)]
#[config]
pub struct GlobalConfig {
    #[source(clap(long), env = "MODELSERVE_REPOSITORY_ROOT", default = "\"models\".into()")]
    pub repository_root: String,

    #[source(clap(long), env = "MODELSERVE_TICK_MS", default = "1000")]
    pub tick_interval_ms: u64,

    #[source(clap(long), env = "MODELSERVE_HTTP_ADDR", default = "\"0.0.0.0:8501\".into()")]
    pub http_addr: String,

    #[source(clap(long), env = "MODELSERVE_RPC_ADDR", default = "\"0.0.0.0:8500\".into()")]
    pub rpc_addr: String,

    /// Model names this process owns (spec §3: a Model's name is stable for
    /// the process lifetime; only its versions are auto-discovered).
    #[source(clap(long), default = "Vec::new()")]
    pub models: Vec<String>,
}

/// Full server configuration (spec §4.6 tick interval default 1s; §3 Policy
/// Config).
#[derive(Debug, Clone)]
pub struct Config {
    pub repository_root: PathBuf,
    pub tick_interval: Duration,
    pub http_addr: String,
    pub rpc_addr: String,
    pub models: Vec<String>,
    pub default_policy: PolicyConfig,
    model_policies: HashMap<String, PolicyConfig>,
}

impl Config {
    /// Parse [`GlobalConfig`] from CLI args/env, as the teacher's own
    /// example binaries parse their pipeline configs.
    pub fn from_env() -> Result<Self, Error> {
        let global = GlobalConfig::parse().map_err(|err| Error::internal(format!("{err}")))?;
        Ok(Config::new(global))
    }

    pub fn new(global: GlobalConfig) -> Self {
        Config {
            repository_root: PathBuf::from(global.repository_root),
            tick_interval: Duration::from_millis(global.tick_interval_ms),
            http_addr: global.http_addr,
            rpc_addr: global.rpc_addr,
            models: global.models,
            default_policy: PolicyConfig::Latest(1),
            model_policies: HashMap::new(),
        }
    }

    /// Override the policy for one model; models without an override fall
    /// back to `default_policy`.
    pub fn with_model_policy(&mut self, model_name: impl Into<String>, policy: PolicyConfig) -> &mut Self {
        self.model_policies.insert(model_name.into(), policy);
        self
    }

    pub fn with_default_policy(&mut self, policy: PolicyConfig) -> &mut Self {
        self.default_policy = policy;
        self
    }

    pub fn policy_for(&self, model_name: &str) -> PolicyConfig {
        self.model_policies
            .get(model_name)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }
}
