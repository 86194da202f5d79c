//! The global hash: every task's fingerprint indirectly depends on it, so it
//! is computed once per run and threaded into each task hash rather than
//! recomputed per task.

use std::collections::BTreeMap;

use turbopath::RelativeUnixPathBuf;

use crate::{
    canon::Canon,
    env::{hash_env_value, pass_through_names, EnvMode},
};

/// The expanded, hashable form of a run's global configuration. Distinct
/// from `turborepo_turbo_json::GlobalHashInputs`, which only carries the raw
/// glob patterns and env var names from `turbo.json` before file globs are
/// walked and env values are read.
#[derive(Debug, Clone)]
pub struct GlobalHashInputs {
    pub global_cache_key: &'static str,
    pub global_file_hashes: BTreeMap<RelativeUnixPathBuf, String>,
    pub root_external_deps_hash: String,
    pub env_vars: BTreeMap<String, String>,
    pub pass_through_env: Option<Vec<String>>,
    pub env_mode: EnvMode,
    pub framework_inference: bool,
}

impl GlobalHashInputs {
    pub fn hash(&self) -> String {
        let mut c = Canon::new();
        c.str(self.global_cache_key);

        c.str("globalFileHashes");
        c.map(
            self.global_file_hashes
                .iter()
                .map(|(path, hash)| (path.as_str(), hash.as_str())),
        );

        c.str("rootExternalDepsHash").str(&self.root_external_deps_hash);

        let hashed_env: BTreeMap<&str, String> = self
            .env_vars
            .iter()
            .map(|(name, value)| (name.as_str(), hash_env_value(value)))
            .collect();
        c.str("envVars");
        c.map(hashed_env.iter().map(|(k, v)| (*k, v.as_str())));

        let pass_through = pass_through_names(self.env_mode, self.pass_through_env.as_deref());
        c.str("passThroughEnv");
        c.strs(pass_through.iter().map(String::as_str));

        c.str("frameworkInference").bool(self.framework_inference);

        c.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GlobalHashInputs {
        GlobalHashInputs {
            global_cache_key: "task-runner-core@1",
            global_file_hashes: BTreeMap::new(),
            root_external_deps_hash: "deadbeef".to_string(),
            env_vars: BTreeMap::new(),
            pass_through_env: None,
            env_mode: EnvMode::Loose,
            framework_inference: false,
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        assert_eq!(base().hash(), base().hash());
    }

    #[test]
    fn env_var_value_changes_hash() {
        let mut changed = base();
        changed.env_vars.insert("NODE_ENV".to_string(), "production".to_string());
        assert_ne!(base().hash(), changed.hash());
    }

    #[test]
    fn loose_mode_ignores_pass_through_list_in_hash() {
        let mut a = base();
        a.pass_through_env = Some(vec!["FOO".to_string()]);
        let b = base();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn strict_mode_pass_through_names_affect_hash() {
        let mut a = base();
        a.env_mode = EnvMode::Strict;
        a.pass_through_env = Some(vec!["FOO".to_string()]);
        let mut b = base();
        b.env_mode = EnvMode::Strict;
        b.pass_through_env = Some(vec!["BAR".to_string()]);
        assert_ne!(a.hash(), b.hash());
    }
}
