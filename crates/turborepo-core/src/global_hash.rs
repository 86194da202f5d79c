//! Bridges `turbo.json`'s raw global configuration (glob patterns and env
//! var names) into the expanded, hashable form `turborepo-task-hash` folds
//! into every task hash: file globs walked and hashed, env names resolved
//! against a snapshot.

use std::collections::BTreeMap;

use turbopath::{AbsoluteSystemPath, AnchoredSystemPathBuf};
use turborepo_scm::Scm;
use turborepo_task_hash::{resolve_env_mode, EnvMode, TaskHashError};

use crate::error::RunError;

#[allow(clippy::too_many_arguments)]
pub(crate) fn resolve_global_hash_inputs(
    scm: &dyn Scm,
    repo_root: &AbsoluteSystemPath,
    raw: &turborepo_turbo_json::GlobalHashInputs,
    root_external_deps_hash: String,
    env_snapshot: &BTreeMap<String, String>,
    base_env_mode: EnvMode,
    pass_through_declared_anywhere: bool,
    framework_inference: bool,
) -> Result<turborepo_task_hash::GlobalHashInputs, RunError> {
    let repo_path = AnchoredSystemPathBuf::new_unchecked("");
    let global_file_hashes = scm
        .tracked_files_hash(repo_root, &repo_path, &raw.global_file_dependencies)
        .map_err(TaskHashError::from)?;

    let env_vars: BTreeMap<String, String> = raw
        .env
        .iter()
        .filter_map(|name| env_snapshot.get(name).map(|value| (name.clone(), value.clone())))
        .collect();

    let env_mode = resolve_env_mode(base_env_mode, pass_through_declared_anywhere);

    Ok(turborepo_task_hash::GlobalHashInputs {
        global_cache_key: raw.global_cache_key,
        global_file_hashes,
        root_external_deps_hash,
        env_vars,
        pass_through_env: raw.pass_through_env.clone(),
        env_mode,
        framework_inference,
    })
}

#[cfg(test)]
mod tests {
    use turbopath::AbsoluteSystemPathBuf;

    use super::*;

    #[test]
    fn only_declared_env_names_are_carried_through() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("CI".to_string(), "true".to_string());
        snapshot.insert("SECRET".to_string(), "hunter2".to_string());

        let raw = turborepo_turbo_json::GlobalHashInputs {
            global_cache_key: "task-runner-core@1",
            global_file_dependencies: Vec::new(),
            env: vec!["CI".to_string()],
            pass_through_env: None,
        };

        let root = AbsoluteSystemPathBuf::new(if cfg!(windows) { "C:\\repo" } else { "/repo" }).unwrap();
        let resolved = resolve_global_hash_inputs(
            &turborepo_scm::Manual,
            root.as_path(),
            &raw,
            "deadbeef".to_string(),
            &snapshot,
            EnvMode::Loose,
            false,
            true,
        )
        .unwrap();

        assert_eq!(resolved.env_vars.len(), 1);
        assert_eq!(resolved.env_vars.get("CI"), Some(&"true".to_string()));
        assert!(resolved.framework_inference);
    }
}
