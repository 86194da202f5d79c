//! Loads and normalizes `turbo.json` pipeline configuration: parses the
//! JSONC source for the root config and zero or more per-package overrides,
//! then resolves each requested task's [`TaskDefinition`] by merging the
//! root pipeline entry with any override and normalizing its `dependsOn`
//! list into a closed set of edge kinds.

mod definition;
mod error;
mod raw;

use std::collections::BTreeMap;

pub use definition::{OutputLogsMode, TaskDefinition};
pub use error::TurboJsonError;
pub use raw::{RawRemoteCacheOptions, RawTaskDefinition, RawTurboJson};
use turbopath::AbsoluteSystemPath;
use turborepo_task_id::TaskId;

/// Folded into every global hash so a change in this core's own hashing
/// rules invalidates every artifact cached under an older version.
pub const GLOBAL_CACHE_KEY: &str = "task-runner-core@1";

/// The root-only fields a package's merged view of the pipeline needs in
/// order to compute a global hash, independent of any single task.
#[derive(Debug, Clone)]
pub struct GlobalHashInputs {
    pub global_cache_key: &'static str,
    pub global_file_dependencies: Vec<String>,
    pub env: Vec<String>,
    pub pass_through_env: Option<Vec<String>>,
}

/// A loaded and JSON-validated (but not yet normalized) `turbo.json`. One
/// value represents the root config; per-package overrides are parsed the
/// same way but only their `tasks` map and `extends` field are consulted.
#[derive(Debug, Clone, Default)]
pub struct TurboJson {
    pub extends: Vec<String>,
    pub global_dependencies: Vec<String>,
    pub global_env: Vec<String>,
    pub global_pass_through_env: Option<Vec<String>>,
    pub cache_dir: String,
    pub tasks: BTreeMap<String, RawTaskDefinition>,
}

impl TurboJson {
    /// Parses `contents` (JSONC) as loaded from `source` (used only for
    /// error messages).
    pub fn parse(source: &str, contents: &str) -> Result<Self, TurboJsonError> {
        let value = jsonc_parser::parse_to_serde_value(contents, &jsonc_parser::ParseOptions::default())
            .map_err(|e| TurboJsonError::Parse(source.to_owned(), e.to_string()))?
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        let raw: RawTurboJson = serde_json::from_value(value)
            .map_err(|e| TurboJsonError::Deserialize(source.to_owned(), e))?;

        for name in raw.global_env.iter().flatten() {
            if name.starts_with('$') {
                return Err(TurboJsonError::EnvPrefixInGlobalEnv(name.clone()));
            }
        }

        if !raw.extends.is_empty() && raw.extends != ["//"] {
            return Err(TurboJsonError::ExtendsNotRoot(raw.extends));
        }

        Ok(TurboJson {
            extends: raw.extends,
            global_dependencies: raw.global_dependencies.unwrap_or_default(),
            global_env: raw.global_env.unwrap_or_default(),
            global_pass_through_env: raw.global_pass_through_env,
            cache_dir: raw.cache_dir.unwrap_or_else(|| ".turbo/cache".to_owned()),
            tasks: raw.tasks,
        })
    }

    /// Reads and parses the `turbo.json` file at `path`, if it exists.
    pub fn load(path: &AbsoluteSystemPath) -> Result<Option<Self>, TurboJsonError> {
        match path.read_existing_to_string().map_err(|e| TurboJsonError::Io(path.to_string(), e))? {
            Some(contents) => Ok(Some(Self::parse(path.as_str(), &contents)?)),
            None => Ok(None),
        }
    }

    pub fn global_hash_inputs(&self) -> GlobalHashInputs {
        GlobalHashInputs {
            global_cache_key: GLOBAL_CACHE_KEY,
            global_file_dependencies: self.global_dependencies.clone(),
            env: self.global_env.clone(),
            pass_through_env: self.global_pass_through_env.clone(),
        }
    }

    /// Resolves `task_id`'s definition by merging this (root) config's
    /// pipeline entry with `package`'s override of the same task, if any.
    /// `single_package` enables the stricter single-repo `dependsOn`
    /// validation described in [`TaskDefinition::merge`].
    pub fn task_definition(
        &self,
        task_id: &TaskId<'_>,
        package: Option<&TurboJson>,
        single_package: bool,
    ) -> Result<(TaskDefinition, Vec<String>), TurboJsonError> {
        let root_entry = self
            .tasks
            .get(task_id.task())
            .ok_or_else(|| TurboJsonError::UnknownTask(task_id.to_string()))?;
        let override_entry = package.and_then(|p| p.tasks.get(task_id.task()));
        TaskDefinition::merge(task_id, root_entry, override_entry, single_package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(tasks_json: &str) -> TurboJson {
        let contents = format!(r#"{{"tasks":{tasks_json}}}"#);
        TurboJson::parse("turbo.json", &contents).unwrap()
    }

    #[test]
    fn parses_jsonc_with_comments() {
        let turbo_json = TurboJson::parse(
            "turbo.json",
            r#"{
                // root config
                "globalDependencies": ["tsconfig.json"],
                "tasks": { "build": { "outputs": ["dist/**"] } }
            }"#,
        )
        .unwrap();
        assert_eq!(turbo_json.global_dependencies, vec!["tsconfig.json"]);
        assert!(turbo_json.tasks.contains_key("build"));
    }

    #[test]
    fn normalizes_depends_on_edge_kinds() {
        let turbo_json = root_with(
            r#"{"build": {"dependsOn": ["^build", "lint", "web#codegen"]}, "lint": {}}"#,
        );
        let task_id = TaskId::root("build");
        let (def, warnings) = turbo_json.task_definition(&task_id, None, false).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(def.topological_dependencies.len(), 1);
        assert_eq!(def.task_dependencies.len(), 1);
        assert_eq!(def.package_dependencies.len(), 1);
        assert_eq!(def.package_dependencies[0].to_string(), "web#codegen");
    }

    #[test]
    fn legacy_dollar_depends_on_becomes_env_dependency_with_warning() {
        let turbo_json = root_with(r#"{"build": {"dependsOn": ["$CI"]}}"#);
        let task_id = TaskId::root("build");
        let (def, warnings) = turbo_json.task_definition(&task_id, None, false).unwrap();
        assert_eq!(def.env_var_dependencies, vec!["CI".to_string()]);
        assert_eq!(def.env, vec!["CI".to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn dollar_prefixed_env_entry_is_fatal() {
        let turbo_json = root_with(r#"{"build": {"env": ["$CI"]}}"#);
        let task_id = TaskId::root("build");
        let err = turbo_json.task_definition(&task_id, None, false).unwrap_err();
        assert!(matches!(err, TurboJsonError::EnvPrefixInEnv(_, _)));
    }

    #[test]
    fn dollar_prefixed_global_env_entry_is_fatal() {
        let err = TurboJson::parse(
            "turbo.json",
            r#"{"globalEnv": ["$CI"], "tasks": {}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TurboJsonError::EnvPrefixInGlobalEnv(_)));
    }

    #[test]
    fn single_package_rejects_cross_package_dep() {
        let turbo_json = root_with(r#"{"build": {"dependsOn": ["other#build"]}}"#);
        let task_id = TaskId::root("build");
        let err = turbo_json
            .task_definition(&task_id, None, true)
            .unwrap_err();
        assert!(matches!(
            err,
            TurboJsonError::SinglePackageCrossPackageDep(_, _)
        ));
    }

    #[test]
    fn single_package_allows_root_qualified_dep() {
        let turbo_json = root_with(
            r#"{"build": {"dependsOn": ["//#prepare"]}, "prepare": {}}"#,
        );
        let task_id = TaskId::root("build");
        let (def, _) = turbo_json
            .task_definition(&task_id, None, true)
            .unwrap();
        assert_eq!(def.package_dependencies.len(), 1);
    }

    #[test]
    fn single_package_rejects_topological_dep() {
        let turbo_json = root_with(r#"{"build": {"dependsOn": ["^build"]}}"#);
        let task_id = TaskId::root("build");
        let err = turbo_json
            .task_definition(&task_id, None, true)
            .unwrap_err();
        assert!(matches!(
            err,
            TurboJsonError::SinglePackageCrossPackageDep(_, _)
        ));
    }

    #[test]
    fn package_override_cannot_redefine_depends_on() {
        let root = root_with(r#"{"build": {"dependsOn": ["^build"]}}"#);
        let package = root_with(r#"{"build": {"dependsOn": ["lint"]}}"#);
        let task_id = TaskId::new("web", "build");
        let err = root
            .task_definition(&task_id, Some(&package), false)
            .unwrap_err();
        assert!(matches!(
            err,
            TurboJsonError::DisallowedOverrideField { field: "dependsOn", .. }
        ));
    }

    #[test]
    fn package_override_may_replace_outputs() {
        let root = root_with(r#"{"build": {"outputs": ["dist/**"]}}"#);
        let package = root_with(r#"{"build": {"outputs": ["build/**"]}}"#);
        let task_id = TaskId::new("web", "build");
        let (def, _) = root
            .task_definition(&task_id, Some(&package), false)
            .unwrap();
        assert_eq!(def.outputs, vec!["build/**".to_string()]);
    }

    #[test]
    fn pass_through_env_none_inherits_root_value() {
        let root = root_with(r#"{"build": {"passThroughEnv": ["AWS_REGION"]}}"#);
        let package = root_with(r#"{"build": {}}"#);
        let task_id = TaskId::new("web", "build");
        let (def, _) = root
            .task_definition(&task_id, Some(&package), false)
            .unwrap();
        assert_eq!(def.pass_through_env, Some(vec!["AWS_REGION".to_string()]));
    }

    #[test]
    fn pass_through_env_explicit_empty_overrides_root_value() {
        let root = root_with(r#"{"build": {"passThroughEnv": ["AWS_REGION"]}}"#);
        let package = root_with(r#"{"build": {"passThroughEnv": []}}"#);
        let task_id = TaskId::new("web", "build");
        let (def, _) = root
            .task_definition(&task_id, Some(&package), false)
            .unwrap();
        assert_eq!(def.pass_through_env, Some(Vec::new()));
    }

    #[test]
    fn extends_must_be_exactly_root() {
        let err = TurboJson::parse("apps/web/turbo.json", r#"{"extends": ["some-other-pkg"]}"#)
            .unwrap_err();
        assert!(matches!(err, TurboJsonError::ExtendsNotRoot(_)));
    }

    #[test]
    fn extends_root_is_accepted() {
        let turbo_json = TurboJson::parse("apps/web/turbo.json", r#"{"extends": ["//"]}"#).unwrap();
        assert_eq!(turbo_json.extends, vec!["//".to_string()]);
    }
}
