use std::fmt;

use serde::Serialize;

use crate::into_system;

/// A repo-relative path using forward slashes regardless of host OS. The
/// canonical form used anywhere a path value becomes part of a hash or a
/// cache archive entry, so that the same fingerprint is produced on every
/// platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RelativeUnixPathBuf(String);

impl RelativeUnixPathBuf {
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_anchored_system_path_buf(&self) -> crate::AnchoredSystemPathBuf {
        crate::AnchoredSystemPathBuf::new_unchecked(into_system(&self.0))
    }
}

impl fmt::Display for RelativeUnixPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RelativeUnixPathBuf {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
