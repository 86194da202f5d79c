use std::{borrow::Borrow, fmt, ops::Deref};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::{relative_unix::RelativeUnixPathBuf, to_unix};

/// A path relative to the repository root, using OS-native separators.
/// Portable to store (independent of where the repo is checked out) but
/// must be resolved against an [`crate::AbsoluteSystemPath`] before use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub struct AnchoredSystemPathBuf(Utf8PathBuf);

#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct AnchoredSystemPath(Utf8Path);

impl AnchoredSystemPathBuf {
    pub fn new_unchecked(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn from_raw(path: impl AsRef<str>) -> Self {
        Self(Utf8PathBuf::from(path.as_ref()))
    }

    pub fn to_unix(&self) -> RelativeUnixPathBuf {
        RelativeUnixPathBuf::new_unchecked(to_unix(self.0.as_str()))
    }

    pub fn as_path(&self) -> &AnchoredSystemPath {
        self
    }
}

impl Borrow<AnchoredSystemPath> for AnchoredSystemPathBuf {
    fn borrow(&self) -> &AnchoredSystemPath {
        unsafe { &*(self.0.as_path() as *const Utf8Path as *const AnchoredSystemPath) }
    }
}

impl Deref for AnchoredSystemPathBuf {
    type Target = AnchoredSystemPath;
    fn deref(&self) -> &Self::Target {
        self.borrow()
    }
}

impl fmt::Display for AnchoredSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AnchoredSystemPath {
    pub fn new(path: &str) -> &Self {
        let utf8 = Utf8Path::new(path);
        unsafe { &*(utf8 as *const Utf8Path as *const AnchoredSystemPath) }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn to_unix(&self) -> RelativeUnixPathBuf {
        RelativeUnixPathBuf::new_unchecked(to_unix(self.0.as_str()))
    }

    pub fn to_owned_buf(&self) -> AnchoredSystemPathBuf {
        AnchoredSystemPathBuf(self.0.to_path_buf())
    }
}

impl fmt::Display for AnchoredSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
