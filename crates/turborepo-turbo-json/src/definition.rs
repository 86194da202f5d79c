use serde::Serialize;
use turborepo_task_id::{TaskId, TaskName};

use crate::{error::TurboJsonError, raw::RawTaskDefinition};

/// Per-package turbo.json overrides may only touch these fields; everything
/// else (most importantly `dependsOn`) is fixed by the root pipeline entry.
const OVERRIDABLE_FIELDS: &[&str] = &[
    "cache",
    "inputs",
    "outputs",
    "outputMode",
    "env",
    "passThroughEnv",
    "persistent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLogsMode {
    #[default]
    Full,
    HashOnly,
    NewOnly,
    ErrorsOnly,
    None,
}

impl OutputLogsMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "hash-only" => Self::HashOnly,
            "new-only" => Self::NewOnly,
            "errors-only" => Self::ErrorsOnly,
            "none" => Self::None,
            _ => Self::Full,
        }
    }
}

/// A task's fully resolved configuration: root pipeline entry merged with
/// any per-package override, and `dependsOn` normalized into its three
/// disjoint edge kinds.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub cache: bool,
    #[serde(skip)]
    pub task_dependencies: Vec<TaskName<'static>>,
    #[serde(skip)]
    pub topological_dependencies: Vec<TaskName<'static>>,
    #[serde(skip)]
    pub package_dependencies: Vec<TaskId<'static>>,
    pub env: Vec<String>,
    /// Legacy `$VAR` entries found in `dependsOn`, folded in here after a
    /// deprecation diagnostic is raised.
    pub env_var_dependencies: Vec<String>,
    pub inputs: Vec<String>,
    /// `None` means inherit the caller's set; `Some(vec![])` is an explicit
    /// empty override, distinct from not specifying the field at all.
    pub pass_through_env: Option<Vec<String>>,
    pub persistent: bool,
    pub interruptible: bool,
    pub outputs: Vec<String>,
    pub output_logs: OutputLogsMode,
    pub interactive: bool,
    pub with: Vec<TaskName<'static>>,
    pub dot_env: Vec<String>,
}

impl TaskDefinition {
    /// Builds the merged, normalized definition for `task_id`. `root` is the
    /// entry from the root pipeline (authoritative for `dependsOn`);
    /// `package_override`, if present, is the same task's entry in the
    /// owning package's own turbo.json.
    pub fn merge(
        task_id: &TaskId<'_>,
        root: &RawTaskDefinition,
        package_override: Option<&RawTaskDefinition>,
        single_package: bool,
    ) -> Result<(Self, Vec<String>), TurboJsonError> {
        if let Some(over) = package_override {
            for field in over.set_field_names() {
                if !OVERRIDABLE_FIELDS.contains(&field) {
                    return Err(TurboJsonError::DisallowedOverrideField {
                        task: task_id.to_string(),
                        field,
                    });
                }
            }
        }

        let mut warnings = Vec::new();
        let (task_dependencies, topological_dependencies, package_dependencies, env_var_deps) =
            normalize_depends_on(task_id, root, single_package, &mut warnings)?;

        let cache = pick(package_override.and_then(|o| o.cache), root.cache).unwrap_or(true);
        let inputs = pick_vec(
            package_override.and_then(|o| o.inputs.clone()),
            root.inputs.clone(),
        );
        let outputs = pick_vec(
            package_override.and_then(|o| o.outputs.clone()),
            root.outputs.clone(),
        );
        let output_logs = pick(
            package_override.and_then(|o| o.output_logs.clone()),
            root.output_logs.clone(),
        )
        .map(|s| OutputLogsMode::parse(&s))
        .unwrap_or_default();
        let persistent =
            pick(package_override.and_then(|o| o.persistent), root.persistent).unwrap_or(false);
        let interruptible = root.interruptible.unwrap_or(false);
        let interactive = root.interactive.unwrap_or(false);
        let with = root
            .with
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(TaskName::from)
            .collect();
        let dot_env = root.dot_env.clone().unwrap_or_default();

        let mut env = pick_vec(
            package_override.and_then(|o| o.env.clone()),
            root.env.clone(),
        );
        validate_no_dollar_prefix(&env, task_id)?;
        env.extend(env_var_deps.iter().cloned());

        let pass_through_env = package_override
            .and_then(|o| o.pass_through_env.clone())
            .or_else(|| root.pass_through_env.clone());

        Ok((
            TaskDefinition {
                cache,
                task_dependencies,
                topological_dependencies,
                package_dependencies,
                env,
                env_var_dependencies: env_var_deps,
                inputs,
                pass_through_env,
                persistent,
                interruptible,
                outputs,
                output_logs,
                interactive,
                with,
                dot_env,
            },
            warnings,
        ))
    }
}

fn pick<T>(over: Option<T>, root: Option<T>) -> Option<T> {
    over.or(root)
}

fn pick_vec(over: Option<Vec<String>>, root: Option<Vec<String>>) -> Vec<String> {
    over.or(root).unwrap_or_default()
}

fn validate_no_dollar_prefix(names: &[String], task_id: &TaskId<'_>) -> Result<(), TurboJsonError> {
    for name in names {
        if name.starts_with('$') {
            return Err(TurboJsonError::EnvPrefixInEnv(
                name.clone(),
                task_id.to_string(),
            ));
        }
    }
    Ok(())
}

#[allow(clippy::type_complexity)]
fn normalize_depends_on(
    task_id: &TaskId<'_>,
    root: &RawTaskDefinition,
    single_package: bool,
    warnings: &mut Vec<String>,
) -> Result<
    (
        Vec<TaskName<'static>>,
        Vec<TaskName<'static>>,
        Vec<TaskId<'static>>,
        Vec<String>,
    ),
    TurboJsonError,
> {
    let mut task_dependencies = Vec::new();
    let mut topological_dependencies = Vec::new();
    let mut package_dependencies = Vec::new();
    let mut env_var_deps = Vec::new();

    for raw in root.depends_on.iter().flatten() {
        match turborepo_task_id::TaskDep::parse(raw) {
            turborepo_task_id::TaskDep::Same(name) => {
                task_dependencies.push(name);
            }
            turborepo_task_id::TaskDep::Topological(name) => {
                if single_package {
                    return Err(TurboJsonError::SinglePackageCrossPackageDep(
                        task_id.to_string(),
                        raw.clone(),
                    ));
                }
                topological_dependencies.push(name);
            }
            turborepo_task_id::TaskDep::Package(pkg, name) => {
                if single_package && !pkg.is_root() {
                    return Err(TurboJsonError::SinglePackageCrossPackageDep(
                        task_id.to_string(),
                        raw.clone(),
                    ));
                }
                package_dependencies
                    .push(TaskId::new(pkg.as_str().to_owned(), name.as_str().to_owned()));
            }
            turborepo_task_id::TaskDep::EnvLegacy(var) => {
                warnings.push(format!(
                    "task `{task_id}`'s `dependsOn` entry `${var}` is deprecated; move it under `env`",
                ));
                env_var_deps.push(var);
            }
        }
    }

    Ok((
        task_dependencies,
        topological_dependencies,
        package_dependencies,
        env_var_deps,
    ))
}
