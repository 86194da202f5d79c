//! Identifiers for tasks and packages, and the normalized forms of a task's
//! `dependsOn` entries once `^`, `pkg#task`, and bare-name spellings have all
//! been resolved to one of a closed set of edge kinds.

use std::{borrow::Cow, fmt, hash::Hash};

mod error;

pub use error::TaskIdError;

/// Separates a package name from a task name in a qualified task id, e.g.
/// `web#build`.
pub const TASK_DELIMITER: char = '#';

/// The synthetic package name used for tasks defined at the repo root and
/// not owned by any workspace package.
pub const ROOT_PKG_NAME: &str = "//";

/// A package's name as it appears in its `package.json`, or [`ROOT_PKG_NAME`]
/// for the synthetic root package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn root() -> Self {
        Self(ROOT_PKG_NAME.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_PKG_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PackageName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A task's name as it appears as a key under `tasks` in `turbo.json`, e.g.
/// `build` or `test`. Never includes a package qualifier; use [`TaskId`] for
/// the qualified form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct TaskName<'a>(Cow<'a, str>);

impl<'a> TaskName<'a> {
    pub fn new(name: impl Into<Cow<'a, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_owned(self) -> TaskName<'static> {
        TaskName(Cow::Owned(self.0.into_owned()))
    }
}

impl<'a> fmt::Display for TaskName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> From<&'a str> for TaskName<'a> {
    fn from(value: &'a str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for TaskName<'static> {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// A package-qualified task id, e.g. `web#build` or `//#format` for a
/// root-owned task. The canonical identity of a single schedulable unit of
/// work: two `TaskId`s are equal iff they name the same task in the same
/// package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId<'a> {
    package: Cow<'a, str>,
    task: Cow<'a, str>,
}

impl<'a> TaskId<'a> {
    pub fn new(package: impl Into<Cow<'a, str>>, task: impl Into<Cow<'a, str>>) -> Self {
        Self {
            package: package.into(),
            task: task.into(),
        }
    }

    pub fn root(task: impl Into<Cow<'a, str>>) -> Self {
        Self {
            package: Cow::Borrowed(ROOT_PKG_NAME),
            task: task.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn task_name(&self) -> TaskName<'_> {
        TaskName::new(Cow::Borrowed(self.task.as_ref()))
    }

    pub fn package_name(&self) -> PackageName {
        PackageName::new(self.package.as_ref())
    }

    pub fn is_root_task(&self) -> bool {
        self.package == ROOT_PKG_NAME
    }

    pub fn into_owned(self) -> TaskId<'static> {
        TaskId {
            package: Cow::Owned(self.package.into_owned()),
            task: Cow::Owned(self.task.into_owned()),
        }
    }

    /// Parses a task descriptor from a `dependsOn` entry or CLI `--filter`
    /// target. Accepts both the qualified `pkg#task` form and a bare task
    /// name, which the caller must resolve against its own package.
    pub fn from_qualified(raw: &'a str) -> Result<Self, TaskIdError> {
        match raw.split_once(TASK_DELIMITER) {
            Some((pkg, task)) if !pkg.is_empty() && !task.is_empty() => Ok(Self {
                package: Cow::Borrowed(pkg),
                task: Cow::Borrowed(task),
            }),
            Some(_) => Err(TaskIdError::Malformed(raw.to_owned())),
            None => Err(TaskIdError::Unqualified(raw.to_owned())),
        }
    }

    pub fn is_qualified(raw: &str) -> bool {
        matches!(raw.split_once(TASK_DELIMITER), Some((pkg, task)) if !pkg.is_empty() && !task.is_empty())
    }
}

impl<'a> fmt::Display for TaskId<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.package, TASK_DELIMITER, self.task)
    }
}

/// One resolved edge out of a task's `dependsOn` list. Parsing collapses the
/// three surface spellings (`^build`, `web#build`, `build`) plus the legacy
/// `$ENV_VAR` form into this closed set so nothing downstream of parsing
/// needs to re-inspect dependency strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskDep {
    /// A bare name: the same task in the same package, e.g. `lint` inside
    /// `build`'s `dependsOn`.
    Same(TaskName<'static>),
    /// A `pkg#task` spelling: a specific task in a specific package.
    Package(PackageName, TaskName<'static>),
    /// A `^task` spelling: the named task in every package this one
    /// depends on, per the workspace package graph.
    Topological(TaskName<'static>),
    /// A legacy `$VAR` entry inside `dependsOn`, kept only to drive a
    /// deprecation diagnostic before being folded into `env`.
    EnvLegacy(String),
}

impl TaskDep {
    /// Parses one entry from a task's `dependsOn` list.
    pub fn parse(raw: &str) -> Self {
        if let Some(var) = raw.strip_prefix('$') {
            return TaskDep::EnvLegacy(var.to_owned());
        }
        if let Some(topo) = raw.strip_prefix('^') {
            return TaskDep::Topological(TaskName::from(topo.to_owned()));
        }
        if TaskId::is_qualified(raw) {
            let (pkg, task) = raw.split_once(TASK_DELIMITER).expect("checked above");
            return TaskDep::Package(PackageName::new(pkg), TaskName::from(task.to_owned()));
        }
        TaskDep::Same(TaskName::from(raw.to_owned()))
    }
}

impl fmt::Display for TaskDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskDep::Same(task) => write!(f, "{task}"),
            TaskDep::Package(pkg, task) => write!(f, "{pkg}{TASK_DELIMITER}{task}"),
            TaskDep::Topological(task) => write!(f, "^{task}"),
            TaskDep::EnvLegacy(var) => write!(f, "${var}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_qualified() {
        let id = TaskId::new("web", "build");
        assert_eq!(id.to_string(), "web#build");
    }

    #[test]
    fn root_task_displays_with_synthetic_package() {
        let id = TaskId::root("format");
        assert_eq!(id.to_string(), "//#format");
        assert!(id.is_root_task());
    }

    #[test]
    fn from_qualified_rejects_bare_name() {
        assert!(matches!(
            TaskId::from_qualified("build"),
            Err(TaskIdError::Unqualified(_))
        ));
    }

    #[test]
    fn from_qualified_rejects_empty_halves() {
        assert!(matches!(
            TaskId::from_qualified("#build"),
            Err(TaskIdError::Malformed(_))
        ));
        assert!(matches!(
            TaskId::from_qualified("web#"),
            Err(TaskIdError::Malformed(_))
        ));
    }

    #[test]
    fn parses_topological_dep() {
        assert_eq!(
            TaskDep::parse("^build"),
            TaskDep::Topological(TaskName::from("build".to_string()))
        );
    }

    #[test]
    fn parses_package_dep() {
        assert_eq!(
            TaskDep::parse("web#build"),
            TaskDep::Package(PackageName::new("web"), TaskName::from("build".to_string()))
        );
    }

    #[test]
    fn parses_same_package_dep() {
        assert_eq!(
            TaskDep::parse("lint"),
            TaskDep::Same(TaskName::from("lint".to_string()))
        );
    }

    #[test]
    fn parses_legacy_env_dep() {
        assert_eq!(
            TaskDep::parse("$CI"),
            TaskDep::EnvLegacy("CI".to_string())
        );
    }
}
