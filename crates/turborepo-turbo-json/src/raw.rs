//! Deserialized-but-unvalidated shape of a `turbo.json` file. One struct
//! covers both the root config and per-package overrides; a package config
//! simply leaves the root-only fields (`globalDependencies`, `remoteCache`,
//! ...) unset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRemoteCacheOptions {
    pub api_url: Option<String>,
    pub login_url: Option<String>,
    pub team_slug: Option<String>,
    pub team_id: Option<String>,
    pub signature: Option<bool>,
    pub preflight: Option<bool>,
    pub timeout: Option<u64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTurboJson {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_dependencies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_env: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_pass_through_env: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_cache: Option<RawRemoteCacheOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub tasks: BTreeMap<String, RawTaskDefinition>,
}

/// One entry under `tasks`. `None` means "not set in this file", which
/// matters for override merging: a package turbo.json's task entry is
/// merged key-by-key over the root entry rather than replacing it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawTaskDefinition {
    pub cache: Option<bool>,
    pub depends_on: Option<Vec<String>>,
    pub env: Option<Vec<String>>,
    pub inputs: Option<Vec<String>>,
    pub pass_through_env: Option<Vec<String>>,
    pub persistent: Option<bool>,
    pub interruptible: Option<bool>,
    pub outputs: Option<Vec<String>>,
    pub output_logs: Option<String>,
    pub interactive: Option<bool>,
    pub with: Option<Vec<String>>,
    /// Loads an ambient `.env` file relative to the package before running
    /// the task; not hashed itself, but the files it names are.
    pub dot_env: Option<Vec<String>>,
}

impl RawTaskDefinition {
    /// Field names this entry sets, for allowlist/error reporting.
    pub fn set_field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.cache.is_some() {
            names.push("cache");
        }
        if self.depends_on.is_some() {
            names.push("dependsOn");
        }
        if self.env.is_some() {
            names.push("env");
        }
        if self.inputs.is_some() {
            names.push("inputs");
        }
        if self.pass_through_env.is_some() {
            names.push("passThroughEnv");
        }
        if self.persistent.is_some() {
            names.push("persistent");
        }
        if self.interruptible.is_some() {
            names.push("interruptible");
        }
        if self.outputs.is_some() {
            names.push("outputs");
        }
        if self.output_logs.is_some() {
            names.push("outputMode");
        }
        if self.interactive.is_some() {
            names.push("interactive");
        }
        if self.with.is_some() {
            names.push("with");
        }
        if self.dot_env.is_some() {
            names.push("dotEnv");
        }
        names
    }
}
