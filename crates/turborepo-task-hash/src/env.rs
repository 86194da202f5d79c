//! Env var resolution policy: which variables get hashed by value, which
//! pass through to the child process by name only, and how `infer` settles
//! into one of the other two modes before a task is ever hashed.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Default-allowed environment names under `Strict` mode even when the task
/// declares no explicit env vars of its own.
pub const STRICT_MODE_ALLOWLIST: &[&str] = &["PATH", "SHELL", "SYSTEMROOT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    Infer,
    Loose,
    Strict,
}

impl EnvMode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "loose" => EnvMode::Loose,
            "strict" => EnvMode::Strict,
            _ => EnvMode::Infer,
        }
    }
}

impl Default for EnvMode {
    fn default() -> Self {
        EnvMode::Infer
    }
}

/// `infer` promotes to `strict` the moment any task declares a non-null
/// `passThroughEnv`; otherwise it behaves as `loose`.
pub fn resolve_env_mode(mode: EnvMode, pass_through_declared_anywhere: bool) -> EnvMode {
    match mode {
        EnvMode::Infer if pass_through_declared_anywhere => EnvMode::Strict,
        EnvMode::Infer => EnvMode::Loose,
        other => other,
    }
}

/// Names that pass through to the child process without being hashed by
/// value. `loose` never hashes pass-through names at all; `strict` collapses
/// a `null`/absent list to empty rather than treating it as "pass nothing
/// was declared".
pub fn pass_through_names(mode: EnvMode, pass_through_env: Option<&[String]>) -> Vec<String> {
    match mode {
        EnvMode::Strict => {
            let mut names: Vec<String> = pass_through_env.unwrap_or_default().to_vec();
            names.sort();
            names.dedup();
            names
        }
        EnvMode::Loose | EnvMode::Infer => Vec::new(),
    }
}

/// Full (untruncated) SHA-256 hex digest of an env var's value. Distinct
/// from [`crate::canon::Canon::finish`]'s 16-char top-level fingerprint:
/// summary `envVars` entries hash each value independently.
pub fn hash_env_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Expands a set of `NAME_*`-style wildcard patterns (a leading `!` marks an
/// exclusion) against a snapshot of the environment, returning the sorted
/// names of the variables that actually matched. Used to fold a detected
/// framework's env var wildcards into a task's hashed env var set.
pub fn expand_env_wildcards(patterns: &[&str], env_snapshot: &BTreeMap<String, String>) -> Vec<String> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut include_patterns = Vec::new();
    let mut exclude_patterns = Vec::new();
    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(rest) => exclude_patterns.push(wildcard_to_regex(rest)),
            None => include_patterns.push(wildcard_to_regex(pattern)),
        }
    }

    let include = Regex::new(&format!("^({})$", include_patterns.join("|"))).ok();
    let exclude = if exclude_patterns.is_empty() {
        None
    } else {
        Regex::new(&format!("^({})$", exclude_patterns.join("|"))).ok()
    };

    let mut matched: Vec<String> = env_snapshot
        .keys()
        .filter(|name| include.as_ref().is_some_and(|re| re.is_match(name)))
        .filter(|name| !exclude.as_ref().is_some_and(|re| re.is_match(name)))
        .cloned()
        .collect();
    matched.sort_unstable();
    matched
}

fn wildcard_to_regex(pattern: &str) -> String {
    pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}
