//! The package-list input a caller hands a run: workspace discovery itself
//! happens upstream, so all this module does is fold an already-resolved
//! `Vec<Package>` into the shapes every downstream crate expects (a
//! [`WorkspaceGraph`], a `PackageInfo` map, an anchored-path map, and a
//! per-package turbo.json override map).

use std::collections::HashMap;

use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use turborepo_graph::WorkspaceGraph;
use turborepo_task_executor::PackageInfo;
use turborepo_task_id::PackageName;
use turborepo_turbo_json::TurboJson;

use crate::error::RunError;

/// One workspace package as discovered upstream of this crate: its name,
/// location, scripts, declared workspace dependencies, the hash of its
/// external (non-workspace) dependency subgraph, and its own turbo.json
/// override, if it has one.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: PackageName,
    pub dir: AbsoluteSystemPathBuf,
    pub scripts: HashMap<String, String>,
    pub dependencies: Vec<PackageName>,
    pub external_deps_hash: String,
    /// Declared npm dependency names (unresolved, from `package.json`), used
    /// only to match a package against a known framework's dependency
    /// signature. Distinct from `dependencies`, which are in-workspace
    /// package references.
    pub external_dependency_names: Vec<String>,
    pub turbo_json: Option<TurboJson>,
}

impl Package {
    pub fn new(name: PackageName, dir: AbsoluteSystemPathBuf) -> Self {
        Self {
            name,
            dir,
            scripts: HashMap::new(),
            dependencies: Vec::new(),
            external_deps_hash: String::new(),
            external_dependency_names: Vec::new(),
            turbo_json: None,
        }
    }

    pub fn with_scripts(mut self, scripts: HashMap<String, String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<PackageName>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_external_deps_hash(mut self, hash: String) -> Self {
        self.external_deps_hash = hash;
        self
    }

    pub fn with_external_dependency_names(mut self, names: Vec<String>) -> Self {
        self.external_dependency_names = names;
        self
    }

    pub fn with_turbo_json(mut self, turbo_json: TurboJson) -> Self {
        self.turbo_json = Some(turbo_json);
        self
    }
}

/// Everything derived from a package list once, up front, so the rest of a
/// run only ever consults these maps rather than re-deriving them per task.
pub struct Workspace {
    pub graph: WorkspaceGraph,
    pub packages: HashMap<String, PackageInfo>,
    pub package_paths: HashMap<String, AnchoredSystemPathBuf>,
    pub package_turbo_jsons: HashMap<PackageName, TurboJson>,
    pub package_dependency_names: HashMap<String, Vec<String>>,
}

impl Workspace {
    pub fn build(repo_root: &AbsoluteSystemPath, packages: &[Package]) -> Result<Self, RunError> {
        let graph = WorkspaceGraph::build(
            packages
                .iter()
                .map(|p| (p.name.clone(), p.dependencies.clone())),
        )?;

        let mut package_infos = HashMap::with_capacity(packages.len());
        let mut package_paths = HashMap::with_capacity(packages.len());
        let mut package_turbo_jsons = HashMap::new();
        let mut package_dependency_names = HashMap::with_capacity(packages.len());

        for package in packages {
            let key = package.name.as_str().to_string();
            package_infos.insert(
                key.clone(),
                PackageInfo::new(package.name.clone(), package.dir.clone())
                    .with_scripts(package.scripts.clone()),
            );
            let anchored = repo_root
                .anchor(package.dir.as_path())
                .unwrap_or_default();
            package_paths.insert(key.clone(), anchored);
            package_dependency_names.insert(key, package.external_dependency_names.clone());
            if let Some(turbo_json) = &package.turbo_json {
                package_turbo_jsons.insert(package.name.clone(), turbo_json.clone());
            }
        }

        Ok(Self {
            graph,
            packages: package_infos,
            package_paths,
            package_turbo_jsons,
            package_dependency_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf::new(if cfg!(windows) { "C:\\repo" } else { "/repo" }).unwrap()
    }

    #[test]
    fn builds_package_info_and_path_maps() {
        let repo_root = root();
        let web_dir = repo_root.join_component("apps").join_component("web");
        let packages = vec![Package::new(PackageName::new("web"), web_dir)];

        let workspace = Workspace::build(repo_root.as_path(), &packages).unwrap();
        assert!(workspace.packages.contains_key("web"));
        assert!(workspace.package_paths.contains_key("web"));
        assert!(workspace.graph.contains(&PackageName::new("web")));
    }

    #[test]
    fn unknown_dependency_is_silently_dropped_by_the_graph() {
        let repo_root = root();
        let packages = vec![Package::new(PackageName::new("web"), repo_root.clone())
            .with_dependencies(vec![PackageName::new("missing")])];

        let workspace = Workspace::build(repo_root.as_path(), &packages).unwrap();
        assert_eq!(
            workspace
                .graph
                .direct_dependencies(&PackageName::new("web"))
                .unwrap(),
            vec![PackageName::root()]
        );
    }
}
