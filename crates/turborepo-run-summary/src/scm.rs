//! Which commit this run saw, so a summary file can be matched back up to
//! the source tree later.

use serde::Serialize;
use turbopath::AbsoluteSystemPath;
use turborepo_scm::Scm;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScmKind {
    Git,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScmState {
    #[serde(rename = "type")]
    pub kind: ScmKind,
    pub sha: Option<String>,
    pub branch: Option<String>,
}

impl ScmState {
    pub fn get(scm: &dyn Scm, repo_root: &AbsoluteSystemPath) -> Self {
        Self {
            kind: ScmKind::Git,
            sha: scm.current_sha(repo_root),
            branch: scm.current_branch(repo_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_scm_reports_no_commit_info() {
        let root = AbsoluteSystemPath::new(if cfg!(windows) { "C:\\tmp" } else { "/tmp" });
        let state = ScmState::get(&turborepo_scm::Manual, root);
        assert!(state.sha.is_none());
        assert!(state.branch.is_none());
    }
}
