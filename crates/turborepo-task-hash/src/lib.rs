//! Content-addressed fingerprints for packages and tasks. A task's hash
//! folds in everything that could change its output: the global
//! configuration hash, its own input files, the env vars it declares, its
//! resolved `dependsOn` definition, forwarded CLI args, and the hashes of
//! whatever it depends on.

mod canon;
mod env;
mod error;
mod global;
mod task;

pub use env::{hash_env_value, pass_through_names, resolve_env_mode, EnvMode, STRICT_MODE_ALLOWLIST};
pub use error::TaskHashError;
pub use global::GlobalHashInputs;
pub use task::{PackageInputsHashes, TaskHashInputs, TaskHashRecord, TaskHashTracker, TaskHasher};
