//! The run-wide inputs every task's hash is built on top of, rendered as
//! their own summary block so a reader can see what invalidated the whole
//! run without hunting through individual task entries.

use std::collections::BTreeMap;

use serde::Serialize;
use turbopath::RelativeUnixPathBuf;
use turborepo_task_hash::{pass_through_names, GlobalHashInputs};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEnvConfiguration {
    pub env: Vec<String>,
    pub pass_through_env: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEnvVarSummary {
    pub specified: GlobalEnvConfiguration,
    pub configured: Vec<String>,
    #[serde(rename = "passthrough")]
    pub pass_through: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalHashSummary {
    pub root_key: &'static str,
    pub files: BTreeMap<RelativeUnixPathBuf, String>,
    pub hash_of_external_dependencies: String,
    pub environment_variables: GlobalEnvVarSummary,
}

impl GlobalHashSummary {
    pub fn new(inputs: &GlobalHashInputs) -> Self {
        // This tree resolves declared env var names straight to their values in
        // one pass, so unlike the upstream split of "explicit" vs. "inferred by
        // wildcard", there's only one configured list to report.
        let configured: Vec<String> = inputs.env_vars.keys().cloned().collect();
        let pass_through = pass_through_names(inputs.env_mode, inputs.pass_through_env.as_deref());

        Self {
            root_key: inputs.global_cache_key,
            files: inputs.global_file_hashes.clone(),
            hash_of_external_dependencies: inputs.root_external_deps_hash.clone(),
            environment_variables: GlobalEnvVarSummary {
                specified: GlobalEnvConfiguration {
                    env: configured.clone(),
                    pass_through_env: inputs.pass_through_env.clone().unwrap_or_default(),
                },
                configured,
                pass_through,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use turborepo_task_hash::EnvMode;

    use super::*;

    #[test]
    fn carries_root_key_and_external_deps_hash_through() {
        let inputs = GlobalHashInputs {
            global_cache_key: "task-runner-core@1",
            global_file_hashes: BTreeMap::new(),
            root_external_deps_hash: "deadbeef".to_string(),
            env_vars: BTreeMap::new(),
            pass_through_env: None,
            env_mode: EnvMode::Loose,
            framework_inference: false,
        };
        let summary = GlobalHashSummary::new(&inputs);
        assert_eq!(summary.root_key, "task-runner-core@1");
        assert_eq!(summary.hash_of_external_dependencies, "deadbeef");
        assert!(summary.environment_variables.pass_through.is_empty());
    }
}
