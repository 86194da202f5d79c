//! Git-aware file hashing. Produces the same content hash `git hash-object`
//! would for a given file, regardless of whether the file is tracked,
//! dirty, or entirely outside version control, so that task fingerprints
//! computed by `turborepo-task-hash` don't change meaning based on repo
//! state.

mod error;
mod hash;

use std::collections::{BTreeMap, BTreeSet};

pub use error::ScmError;
pub use hash::git_blob_hash;
use globset::{Glob, GlobSetBuilder};
use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath, RelativeUnixPathBuf};

/// Abstracts file-content hashing over "inside a git repo" and "no VCS at
/// all" so callers never need to branch on whether `.git` exists.
pub trait Scm {
    /// Hashes every file under `package_path` that matches `inputs` (or
    /// every file, if `inputs` is empty), keyed by path relative to
    /// `repo_root`. Deleted files are silently excluded.
    fn tracked_files_hash(
        &self,
        repo_root: &AbsoluteSystemPath,
        package_path: &AnchoredSystemPath,
        inputs: &[String],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError>;

    /// Hashes an explicit list of paths relative to `root`, skipping any
    /// that don't exist. Used for `dotEnv` and other named-file inputs
    /// that bypass glob resolution.
    fn hash_existing_of(
        &self,
        root: &AbsoluteSystemPath,
        relative_paths: &[RelativeUnixPathBuf],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError>;

    fn current_branch(&self, repo_root: &AbsoluteSystemPath) -> Option<String>;
    fn current_sha(&self, repo_root: &AbsoluteSystemPath) -> Option<String>;
}

/// Backed by an actual git repository: enumerates tracked files from the
/// index and untracked-but-not-`.gitignore`d files from a directory walk.
pub struct Git;

/// No VCS detected: every file under the queried directory is a candidate,
/// filtered only by `.gitignore`-style rules found on disk (there being no
/// index to consult).
pub struct Manual;

impl Scm for Git {
    fn tracked_files_hash(
        &self,
        repo_root: &AbsoluteSystemPath,
        package_path: &AnchoredSystemPath,
        inputs: &[String],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
        let candidates = enumerate_git(repo_root, package_path)?;
        filter_and_hash(repo_root, package_path, candidates, inputs)
    }

    fn hash_existing_of(
        &self,
        root: &AbsoluteSystemPath,
        relative_paths: &[RelativeUnixPathBuf],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
        hash_existing(root, relative_paths)
    }

    fn current_branch(&self, repo_root: &AbsoluteSystemPath) -> Option<String> {
        let repo = git2::Repository::open(repo_root.as_std_path()).ok()?;
        let head = repo.head().ok()?;
        head.shorthand().map(str::to_owned)
    }

    fn current_sha(&self, repo_root: &AbsoluteSystemPath) -> Option<String> {
        let repo = git2::Repository::open(repo_root.as_std_path()).ok()?;
        let head = repo.head().ok()?;
        head.target().map(|oid| oid.to_string())
    }
}

impl Scm for Manual {
    fn tracked_files_hash(
        &self,
        repo_root: &AbsoluteSystemPath,
        package_path: &AnchoredSystemPath,
        inputs: &[String],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
        let candidates = enumerate_manual(repo_root, package_path)?;
        filter_and_hash(repo_root, package_path, candidates, inputs)
    }

    fn hash_existing_of(
        &self,
        root: &AbsoluteSystemPath,
        relative_paths: &[RelativeUnixPathBuf],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
        hash_existing(root, relative_paths)
    }

    fn current_branch(&self, _repo_root: &AbsoluteSystemPath) -> Option<String> {
        None
    }

    fn current_sha(&self, _repo_root: &AbsoluteSystemPath) -> Option<String> {
        None
    }
}

/// Opens `repo_root` as a git repository, falling back to [`Manual`] when
/// it isn't one (or the `git` checkout is damaged enough that libgit2
/// refuses it) — callers ask for a hasher, not a yes/no on VCS presence.
pub fn detect(repo_root: &AbsoluteSystemPath) -> Box<dyn Scm> {
    match git2::Repository::open(repo_root.as_std_path()) {
        Ok(_) => Box::new(Git),
        Err(_) => Box::new(Manual),
    }
}

fn enumerate_git(
    repo_root: &AbsoluteSystemPath,
    package_path: &AnchoredSystemPath,
) -> Result<BTreeSet<RelativeUnixPathBuf>, ScmError> {
    let repo = git2::Repository::open(repo_root.as_std_path())?;
    let package_abs = repo_root.resolve(package_path);
    let mut paths = BTreeSet::new();

    let index = repo.index()?;
    for entry in index.iter() {
        let rel_str = String::from_utf8_lossy(&entry.path).into_owned();
        let rel = RelativeUnixPathBuf::new_unchecked(rel_str);
        let abs = repo_root.resolve(&rel.to_anchored_system_path_buf());
        if !abs.exists() {
            // removed from the working tree but not yet staged as deleted
            continue;
        }
        if within(&abs, &package_abs) {
            paths.insert(rel);
        }
    }

    for entry in walk_untracked(repo_root, &package_abs)? {
        paths.insert(entry);
    }

    Ok(paths)
}

fn enumerate_manual(
    repo_root: &AbsoluteSystemPath,
    package_path: &AnchoredSystemPath,
) -> Result<BTreeSet<RelativeUnixPathBuf>, ScmError> {
    let package_abs = repo_root.resolve(package_path);
    walk_untracked(repo_root, &package_abs)
}

fn walk_untracked(
    repo_root: &AbsoluteSystemPath,
    package_abs: &AbsoluteSystemPathBuf,
) -> Result<BTreeSet<RelativeUnixPathBuf>, ScmError> {
    let mut paths = BTreeSet::new();
    if !package_abs.exists() {
        return Ok(paths);
    }
    let mut builder = ignore::WalkBuilder::new(package_abs.as_std_path());
    builder.hidden(false).standard_filters(true);
    for entry in builder.build() {
        let entry = entry.map_err(|e| {
            ScmError::Io(package_abs.to_string(), std::io::Error::other(e))
        })?;
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let abs_str = entry
            .path()
            .to_str()
            .ok_or_else(|| ScmError::Io(package_abs.to_string(), std::io::Error::other("non-utf8 path")))?
            .to_owned();
        let abs = AbsoluteSystemPathBuf::new(abs_str)?;
        let anchored = repo_root.anchor(&abs)?;
        paths.insert(anchored.to_unix());
    }
    Ok(paths)
}

fn within(abs: &AbsoluteSystemPathBuf, package_abs: &AbsoluteSystemPathBuf) -> bool {
    abs.as_std_path().starts_with(package_abs.as_std_path())
}

fn filter_and_hash(
    repo_root: &AbsoluteSystemPath,
    package_path: &AnchoredSystemPath,
    candidates: BTreeSet<RelativeUnixPathBuf>,
    inputs: &[String],
) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
    let package_unix = package_path.to_unix();
    let matcher = build_matcher(inputs)?;

    let mut out = BTreeMap::new();
    for rel in candidates {
        let package_relative = strip_package_prefix(rel.as_str(), package_unix.as_str());
        if !matcher.is_match(package_relative) {
            continue;
        }
        let abs = repo_root.resolve(&rel.to_anchored_system_path_buf());
        if !abs.exists() {
            continue;
        }
        let contents = abs.read()?;
        out.insert(rel, git_blob_hash(&contents));
    }
    Ok(out)
}

fn hash_existing(
    root: &AbsoluteSystemPath,
    relative_paths: &[RelativeUnixPathBuf],
) -> Result<BTreeMap<RelativeUnixPathBuf, String>, ScmError> {
    let mut out = BTreeMap::new();
    for rel in relative_paths {
        let abs = root.resolve(&rel.to_anchored_system_path_buf());
        if !abs.exists() {
            continue;
        }
        let contents = abs.read()?;
        out.insert(rel.clone(), git_blob_hash(&contents));
    }
    Ok(out)
}

fn strip_package_prefix<'a>(rel: &'a str, package: &str) -> &'a str {
    if package.is_empty() {
        return rel;
    }
    rel.strip_prefix(package)
        .and_then(|s| s.strip_prefix('/'))
        .unwrap_or(rel)
}

fn build_matcher(inputs: &[String]) -> Result<InputMatcher, ScmError> {
    if inputs.is_empty() {
        return Ok(InputMatcher(None));
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in inputs {
        let glob = Glob::new(pattern).map_err(|e| ScmError::BadPattern(pattern.clone(), e))?;
        builder.add(glob);
    }
    Ok(InputMatcher(Some(builder.build()?)))
}

struct InputMatcher(Option<globset::GlobSet>);

impl InputMatcher {
    fn is_match(&self, path: &str) -> bool {
        self.0.as_ref().map_or(true, |set| set.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf};

    use super::*;

    fn tmp_repo() -> (tempfile::TempDir, AbsoluteSystemPathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_str().unwrap()).unwrap();
        (tmp, root)
    }

    fn git(root: &AbsoluteSystemPath, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(root.as_std_path())
            .status()
            .unwrap_or_else(|e| panic!("failed to run git {args:?}: {e}"));
        assert!(status.success(), "git {args:?} failed");
    }

    fn init(root: &AbsoluteSystemPath) {
        git(root, &["init", "-q", "."]);
        git(root, &["config", "--local", "user.name", "test"]);
        git(root, &["config", "--local", "user.email", "test@example.com"]);
    }

    #[test]
    fn hashes_tracked_and_untracked_files() {
        let (_tmp, root) = tmp_repo();
        init(&root);
        root.join_component("committed.txt").write("one").unwrap();
        git(&root, &["add", "."]);
        git(&root, &["commit", "-q", "-m", "initial"]);
        root.join_component("untracked.txt").write("two").unwrap();

        let package_path = turbopath::AnchoredSystemPathBuf::new_unchecked("");
        let hashes = Git
            .tracked_files_hash(&root, &package_path, &[])
            .unwrap();

        assert_eq!(
            hashes
                .get(&RelativeUnixPathBuf::new_unchecked("committed.txt"))
                .unwrap(),
            &git_blob_hash(b"one")
        );
        assert_eq!(
            hashes
                .get(&RelativeUnixPathBuf::new_unchecked("untracked.txt"))
                .unwrap(),
            &git_blob_hash(b"two")
        );
    }

    #[test]
    fn excludes_files_deleted_from_the_working_tree() {
        let (_tmp, root) = tmp_repo();
        init(&root);
        root.join_component("gone.txt").write("x").unwrap();
        git(&root, &["add", "."]);
        git(&root, &["commit", "-q", "-m", "initial"]);
        std::fs::remove_file(root.join_component("gone.txt").as_std_path()).unwrap();

        let package_path = turbopath::AnchoredSystemPathBuf::new_unchecked("");
        let hashes = Git
            .tracked_files_hash(&root, &package_path, &[])
            .unwrap();
        assert!(!hashes.contains_key(&RelativeUnixPathBuf::new_unchecked("gone.txt")));
    }

    #[test]
    fn respects_inputs_glob() {
        let (_tmp, root) = tmp_repo();
        init(&root);
        root.join_component("keep.rs").write("a").unwrap();
        root.join_component("skip.md").write("b").unwrap();
        git(&root, &["add", "."]);
        git(&root, &["commit", "-q", "-m", "initial"]);

        let package_path = turbopath::AnchoredSystemPathBuf::new_unchecked("");
        let hashes = Git
            .tracked_files_hash(&root, &package_path, &["*.rs".to_string()])
            .unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key(&RelativeUnixPathBuf::new_unchecked("keep.rs")));
    }

    #[test]
    fn manual_hashes_without_a_repo() {
        let (_tmp, root) = tmp_repo();
        root.join_component("a.txt").write("hello").unwrap();

        let package_path = turbopath::AnchoredSystemPathBuf::new_unchecked("");
        let hashes = Manual
            .tracked_files_hash(&root, &package_path, &[])
            .unwrap();
        assert_eq!(
            hashes.get(&RelativeUnixPathBuf::new_unchecked("a.txt")).unwrap(),
            &git_blob_hash(b"hello")
        );
    }

    #[test]
    fn detect_falls_back_to_manual_outside_a_repo() {
        let (_tmp, root) = tmp_repo();
        let scm = detect(&root);
        assert!(scm.current_sha(&root).is_none());
    }
}
