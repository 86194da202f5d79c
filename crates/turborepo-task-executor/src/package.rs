//! The piece of package identity this crate needs: where a package lives on
//! disk and which shell command each of its script names runs. Workspace
//! discovery itself lives upstream of this crate; callers hand in the
//! already-resolved list.

use std::collections::HashMap;

use turbopath::AbsoluteSystemPathBuf;
use turborepo_task_id::PackageName;

/// One workspace package (or the synthetic root package), immutable once
/// workspace discovery has produced it.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: PackageName,
    pub dir: AbsoluteSystemPathBuf,
    pub scripts: HashMap<String, String>,
}

impl PackageInfo {
    pub fn new(name: PackageName, dir: AbsoluteSystemPathBuf) -> Self {
        Self {
            name,
            dir,
            scripts: HashMap::new(),
        }
    }

    pub fn with_scripts(mut self, scripts: HashMap<String, String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn script(&self, task: &str) -> Option<&str> {
        self.scripts.get(task).map(String::as_str)
    }
}
