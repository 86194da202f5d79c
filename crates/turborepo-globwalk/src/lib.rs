//! Glob-based file discovery used to resolve task `inputs`/`outputs` globs
//! and workspace package globs to a concrete set of paths on disk.
//!
//! Include and exclude lists are each turbo-style doublestar globs, unix
//! separators only, anchored at a caller-supplied base path. An empty
//! include list matches everything; exclude always wins over include.

mod empty_glob;

use std::{
    borrow::Cow,
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use empty_glob::InclusiveEmptyGlobSet;
use globset::{Glob, GlobSet, GlobSetBuilder};
use itertools::Itertools;
use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, PathError};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WalkType {
    Files,
    Folders,
    All,
}

impl WalkType {
    fn should_emit(&self, is_dir: bool) -> bool {
        match self {
            WalkType::Files => !is_dir,
            WalkType::Folders => is_dir,
            WalkType::All => true,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MatchType {
    Match,
    None,
    Exclude,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("bad glob pattern `{0}`: {1}")]
    BadPattern(String, globset::Error),
    #[error("path is not valid UTF-8 or has no unix-slash form")]
    InvalidPath,
    #[error("walk error: {0}")]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Splits a turbo-style glob list into its positive and `!`-negated halves,
/// stripping the `!` prefix from the latter. Output globs (and nowhere else
/// in this format) mix inclusions and exclusions in one list.
pub fn split_negated(patterns: &[String]) -> (Vec<String>, Vec<String>) {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(rest) => exclude.push(rest.to_string()),
            None => include.push(pattern.clone()),
        }
    }
    (include, exclude)
}

/// Walks `base_path`, yielding entries that match `include` (or everything,
/// if `include` is empty) and do not match `exclude`.
pub fn globwalk(
    base_path: &AbsoluteSystemPath,
    include: &[String],
    exclude: &[String],
    walk_type: WalkType,
) -> Result<HashSet<AbsoluteSystemPathBuf>, WalkError> {
    let (new_base, include_globs, exclude_globs) =
        preprocess_paths_and_globs(base_path, include, exclude)?;

    let include_patterns = include_globs
        .iter()
        .map(|s| compile(s))
        .collect::<Result<Vec<_>, _>>()?;
    let exclude_patterns = exclude_globs
        .iter()
        .map(|s| compile(s))
        .collect::<Result<Vec<_>, _>>()?;

    let include_set = InclusiveEmptyGlobSet::new(&include_patterns)
        .map_err(|e| WalkError::BadPattern(include_globs.iter().join(","), e))?;
    let exclude_set = build_set(&exclude_patterns)
        .map_err(|e| WalkError::BadPattern(exclude_globs.iter().join(","), e))?;

    let mut results = HashSet::new();
    let walker = walkdir::WalkDir::new(&new_base).follow_links(false);
    let mut iter = walker.into_iter();

    while let Some(entry) = iter.next() {
        let (is_symlink, path) = match entry {
            Ok(entry) => (entry.path_is_symlink(), entry.into_path()),
            Err(err) => match (err.io_error(), err.path()) {
                (Some(io_err), Some(path))
                    if io_err.kind() == ErrorKind::NotFound && path.is_symlink() =>
                {
                    (true, path.to_owned())
                }
                _ => return Err(err.into()),
            },
        };

        let is_directory = !path.is_symlink() && path.is_dir();
        let match_type = do_match(&path, &include_set, &exclude_set)?;

        if (match_type == MatchType::Exclude || is_symlink) && is_directory {
            iter.skip_current_dir();
        }

        if match_type == MatchType::Match && walk_type.should_emit(is_directory) {
            results.insert(AbsoluteSystemPathBuf::new(
                path.to_str().ok_or(WalkError::InvalidPath)?.to_owned(),
            )?);
        }
    }

    Ok(results)
}

fn compile(pattern: &str) -> Result<Glob, WalkError> {
    Glob::new(pattern).map_err(|e| WalkError::BadPattern(pattern.to_owned(), e))
}

fn build_set(patterns: &[Glob]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(p.clone());
    }
    builder.build()
}

fn do_match(
    path: &Path,
    include: &InclusiveEmptyGlobSet,
    exclude: &GlobSet,
) -> Result<MatchType, WalkError> {
    let path_unix = to_slash(path).ok_or(WalkError::InvalidPath)?;
    if exclude.is_match(&path_unix) {
        return Ok(MatchType::Exclude);
    }
    if include.is_match(&path_unix) {
        return Ok(MatchType::Match);
    }
    Ok(MatchType::None)
}

#[cfg(windows)]
fn to_slash(path: &Path) -> Option<String> {
    path.to_str().map(|s| s.replace('\\', "/"))
}

#[cfg(not(windows))]
fn to_slash(path: &Path) -> Option<String> {
    path.to_str().map(|s| s.to_owned())
}

fn join_unix_like_paths(a: &str, b: &str) -> String {
    [a.trim_end_matches('/'), "/", b.trim_start_matches('/')].concat()
}

/// Anchors `include`/`exclude` at `base_path`, lexically collapses any `.`
/// and `..` segments (globs may traverse above `base_path` but never above
/// its filesystem root), and narrows the walk's actual base path down to
/// the longest prefix every collapsed include glob still shares.
fn preprocess_paths_and_globs(
    base_path: &AbsoluteSystemPath,
    include: &[String],
    exclude: &[String],
) -> Result<(PathBuf, Vec<String>, Vec<String>), WalkError> {
    let base_slash = to_slash(base_path.as_std_path()).ok_or(WalkError::InvalidPath)?;

    let (include_paths, lowest_segment) = include
        .iter()
        .map(|s| join_unix_like_paths(&base_slash, s))
        .filter_map(|s| collapse_path(&s).map(|(s, v)| (s.to_string(), v)))
        .fold(
            (vec![], usize::MAX),
            |(mut acc, lowest), (path, lowest_next)| {
                acc.push(path);
                (acc, std::cmp::min(lowest, lowest_next))
            },
        );

    let new_base = base_path
        .as_std_path()
        .components()
        .take(lowest_segment.saturating_add(1))
        .collect::<PathBuf>();

    let mut exclude_paths = vec![];
    for collapsed in exclude
        .iter()
        .map(|s| join_unix_like_paths(&base_slash, s))
        .filter_map(|g| collapse_path(&g).map(|(s, _)| s.to_string()))
    {
        if collapsed.ends_with('/') {
            if collapsed.ends_with("**/") {
                exclude_paths.push(collapsed[..collapsed.len() - 1].to_string());
            } else {
                exclude_paths.push(format!("{collapsed}**"));
            }
        } else if collapsed.ends_with("/**") {
            exclude_paths.push(collapsed);
        } else {
            exclude_paths.push(format!("{collapsed}/**"));
            exclude_paths.push(collapsed);
        }
    }

    Ok((new_base, include_paths, exclude_paths))
}

/// Removes `.`/`..` segments from a unix-style path, returning the cleaned
/// path and the index of the shallowest segment a collapse touched (used to
/// compute how far the walk's base path must retreat).
fn collapse_path(path: &str) -> Option<(Cow<str>, usize)> {
    let mut stack: Vec<&str> = vec![];
    let mut changed = false;
    let is_root = path.starts_with('/');
    let mut lowest_index = None;

    for segment in path.trim_start_matches('/').split('/') {
        match segment {
            ".." => {
                stack.pop()?;
                lowest_index.get_or_insert(stack.len());
                changed = true;
            }
            "." => {
                lowest_index.get_or_insert(stack.len());
                changed = true;
            }
            _ => stack.push(segment),
        }
        if let Some(idx) = lowest_index.as_mut() {
            *idx = (*idx).min(stack.len());
        }
    }

    let lowest_index = lowest_index.unwrap_or(stack.len());
    if !changed {
        Some((Cow::Borrowed(path), lowest_index))
    } else {
        let joined = if is_root {
            std::iter::once("").chain(stack).join("/")
        } else {
            stack.join("/")
        };
        Some((Cow::Owned(joined), lowest_index))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use turbopath::AbsoluteSystemPathBuf;

    use super::*;

    #[test_case("a/./././b", "a/b", 1)]
    #[test_case("a/../b", "b", 0)]
    #[test_case("a/./../b", "b", 0)]
    #[test_case("./a/b", "a/b", 0)]
    #[test_case("a/b/..", "a", 1)]
    #[test_case("a/b/.", "a/b", 2)]
    #[test_case("/a/./././b", "/a/b", 1)]
    #[test_case("/a/../b", "/b", 0)]
    fn test_collapse_path(path: &str, expected: &str, lowest: usize) {
        let (collapsed, idx) = collapse_path(path).unwrap();
        assert_eq!(collapsed, expected);
        assert_eq!(idx, lowest);
    }

    #[test_case("../a/b")]
    #[test_case("/../a")]
    fn test_collapse_path_none(path: &str) {
        assert_eq!(collapse_path(path), None);
    }

    fn setup_files(files: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for file in files {
            let file = file.trim_start_matches('/');
            let path = tmp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::File::create(path).unwrap();
        }
        tmp
    }

    #[test]
    fn finds_workspace_package_json_files() {
        let files = &[
            "apps/docs/package.json",
            "apps/web/package.json",
            "packages/ui/package.json",
            "node_modules/dep/package.json",
            "package.json",
        ];
        let tmp = setup_files(files);
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_str().unwrap()).unwrap();
        let include = vec![
            "apps/*/package.json".to_string(),
            "packages/*/package.json".to_string(),
        ];
        let exclude = vec!["**/node_modules/**".to_string()];

        let found = globwalk(&root, &include, &exclude, WalkType::Files).unwrap();
        let relative = found
            .iter()
            .map(|p| root.anchor(p).unwrap().as_str().to_owned())
            .collect::<HashSet<_>>();

        assert_eq!(
            relative,
            HashSet::from([
                "apps/docs/package.json".replace('/', std::path::MAIN_SEPARATOR_STR),
                "apps/web/package.json".replace('/', std::path::MAIN_SEPARATOR_STR),
                "packages/ui/package.json".replace('/', std::path::MAIN_SEPARATOR_STR),
            ])
        );
    }

    #[test]
    fn empty_include_matches_all_files() {
        let files = &["a.txt", "sub/b.txt"];
        let tmp = setup_files(files);
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_str().unwrap()).unwrap();
        let found = globwalk(&root, &[], &[], WalkType::Files).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn exclude_wins_over_include() {
        let files = &["dist/index.js", "dist/index.js.map"];
        let tmp = setup_files(files);
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_str().unwrap()).unwrap();
        let include = vec!["dist/**".to_string()];
        let exclude = vec!["dist/*.map".to_string()];
        let found = globwalk(&root, &include, &exclude, WalkType::Files).unwrap();
        let relative = found
            .iter()
            .map(|p| root.anchor(p).unwrap().as_str().to_owned())
            .collect::<HashSet<_>>();
        assert_eq!(
            relative,
            HashSet::from(["dist/index.js".replace('/', std::path::MAIN_SEPARATOR_STR)])
        );
    }

    #[test]
    fn directory_traversal_stays_within_filesystem() {
        let files = &["root-file", "child/some-file"];
        let tmp = setup_files(files);
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_str().unwrap()).unwrap();
        let child = root.join_component("child");
        let include = vec!["../*-file".to_string()];
        let found = globwalk(&child, &include, &[], WalkType::Files).unwrap();
        let relative = found
            .iter()
            .map(|p| root.anchor(p).unwrap().as_str().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(relative, vec!["root-file".to_string()]);
    }
}
