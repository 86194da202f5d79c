use std::{borrow::Borrow, fmt, fs, ops::Deref, path::Path};

use camino::{Utf8Path, Utf8PathBuf};
use path_clean::PathClean;
use serde::Serialize;

use crate::{anchored::AnchoredSystemPath, error::PathError, into_system};

/// An absolute, OS-native path. Owned variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AbsoluteSystemPathBuf(Utf8PathBuf);

/// An absolute, OS-native path. Borrowed variant, unsized like [`Path`].
#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct AbsoluteSystemPath(Utf8Path);

impl AbsoluteSystemPathBuf {
    /// Validates that `path` is absolute and wraps it.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let raw = path.into();
        if !Path::new(&raw).is_absolute() {
            return Err(PathError::NotAbsolute(raw));
        }
        Ok(Self(Utf8PathBuf::from(into_system(&raw))))
    }

    /// Joins `base` with a possibly-relative, possibly-absolute path,
    /// lexically cleaning the result. Used when resolving paths from
    /// sources (turbo.json globs, CLI args) that may be either.
    pub fn from_unknown(base: &AbsoluteSystemPath, unknown: impl AsRef<Utf8Path>) -> Self {
        let unknown = unknown.as_ref();
        if unknown.is_absolute() {
            Self(unknown.to_path_buf())
        } else {
            let joined = base.0.as_std_path().join(unknown).clean();
            Self(Utf8PathBuf::try_from(joined).expect("joined path retains UTF-8"))
        }
    }

    pub fn as_path(&self) -> &AbsoluteSystemPath {
        self
    }

    pub fn create_dir_all(&self) -> Result<(), PathError> {
        fs::create_dir_all(&self.0).map_err(PathError::from)
    }
}

impl Borrow<AbsoluteSystemPath> for AbsoluteSystemPathBuf {
    fn borrow(&self) -> &AbsoluteSystemPath {
        // SAFETY: AbsoluteSystemPath is a #[repr(transparent)] wrapper over
        // Utf8Path, matching the relationship between Path and PathBuf.
        unsafe { &*(self.0.as_path() as *const Utf8Path as *const AbsoluteSystemPath) }
    }
}

impl Deref for AbsoluteSystemPathBuf {
    type Target = AbsoluteSystemPath;
    fn deref(&self) -> &Self::Target {
        self.borrow()
    }
}

impl AsRef<AbsoluteSystemPath> for AbsoluteSystemPathBuf {
    fn as_ref(&self) -> &AbsoluteSystemPath {
        self
    }
}

impl fmt::Display for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AbsoluteSystemPath {
    /// Borrows `path` as an `AbsoluteSystemPath` without copying.
    ///
    /// # Panics
    /// Panics if `path` is not absolute or not valid UTF-8 — callers that
    /// cannot guarantee this should go through [`AbsoluteSystemPathBuf::new`].
    pub fn new(path: &str) -> &Self {
        assert!(Path::new(path).is_absolute(), "not absolute: {path}");
        let utf8 = Utf8Path::new(path);
        unsafe { &*(utf8 as *const Utf8Path as *const AbsoluteSystemPath) }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_std_path(&self) -> &Path {
        self.0.as_std_path()
    }

    pub fn to_owned(&self) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.to_path_buf())
    }

    pub fn join_component(&self, segment: &str) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.join(segment))
    }

    pub fn parent(&self) -> Option<&AbsoluteSystemPath> {
        self.0.parent().map(|p| unsafe {
            &*(p as *const Utf8Path as *const AbsoluteSystemPath)
        })
    }

    pub fn exists(&self) -> bool {
        self.0.as_std_path().exists()
    }

    pub fn create_dir_all(&self) -> Result<(), PathError> {
        fs::create_dir_all(&self.0).map_err(PathError::from)
    }

    pub fn resolve(&self, anchored: &AnchoredSystemPath) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.join(anchored.as_str()))
    }

    /// Computes `target` relative to `self`, failing if `target` does not
    /// live inside `self`.
    pub fn anchor(&self, target: &AbsoluteSystemPath) -> Result<AnchoredSystemPathBuf, PathError> {
        let relative = target
            .0
            .strip_prefix(&self.0)
            .map_err(|_| PathError::NotParent(target.0.to_string(), self.0.to_string()))?;
        Ok(AnchoredSystemPathBuf::new_unchecked(
            relative.as_str().to_owned(),
        ))
    }

    pub fn read(&self) -> Result<Vec<u8>, PathError> {
        fs::read(&self.0).map_err(PathError::from)
    }

    pub fn read_to_string(&self) -> Result<String, PathError> {
        fs::read_to_string(&self.0).map_err(PathError::from)
    }

    pub fn read_existing_to_string(&self) -> Result<Option<String>, PathError> {
        match fs::read_to_string(&self.0) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, contents: impl AsRef<[u8]>) -> Result<(), PathError> {
        fs::write(&self.0, contents).map_err(PathError::from)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.extension()
    }

    pub fn open(&self) -> Result<fs::File, PathError> {
        fs::File::open(&self.0).map_err(PathError::from)
    }

    pub fn open_with_options(&self, options: fs::OpenOptions) -> Result<fs::File, PathError> {
        options.open(&self.0).map_err(PathError::from)
    }

    pub fn create_with_contents(&self, contents: impl AsRef<[u8]>) -> Result<(), PathError> {
        self.write(contents)
    }

    pub fn symlink_metadata(&self) -> Result<fs::Metadata, PathError> {
        fs::symlink_metadata(&self.0).map_err(PathError::from)
    }

    pub fn read_link(&self) -> Result<std::path::PathBuf, PathError> {
        fs::read_link(&self.0).map_err(PathError::from)
    }

    pub fn remove_file(&self) -> Result<(), PathError> {
        fs::remove_file(&self.0).map_err(PathError::from)
    }

    pub fn rename(&self, to: &AbsoluteSystemPath) -> Result<(), PathError> {
        fs::rename(&self.0, &to.0).map_err(PathError::from)
    }

    #[cfg(unix)]
    pub fn symlink_to_file(&self, target: impl AsRef<Path>) -> Result<(), PathError> {
        std::os::unix::fs::symlink(target, &self.0).map_err(PathError::from)
    }

    #[cfg(unix)]
    pub fn set_mode(&self, mode: u32) -> Result<(), PathError> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&self.0, fs::Permissions::from_mode(mode)).map_err(PathError::from)
    }
}

impl fmt::Display for AbsoluteSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

use crate::anchored::AnchoredSystemPathBuf;
