//! Unpacks a cache archive back onto disk. Every entry's path is cleaned
//! and checked against the anchor before anything is written; a task's
//! archive can contain symlinks that point outside its own output globs
//! (built by another tool, copied from elsewhere), so nested writes are
//! resolved through any symlink prefix before the containment check runs.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
};

use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};

use crate::error::CacheError;

pub struct CacheReader {
    reader: Box<dyn Read>,
}

impl CacheReader {
    pub fn from_reader(reader: impl Read + 'static, is_compressed: bool) -> Result<Self, CacheError> {
        let reader: Box<dyn Read> = if is_compressed {
            Box::new(zstd::Decoder::new(reader)?)
        } else {
            Box::new(reader)
        };
        Ok(CacheReader { reader })
    }

    pub fn open(path: &AbsoluteSystemPathBuf) -> Result<Self, CacheError> {
        let file = path.open()?;
        let is_compressed = path.extension() == Some("zst");
        Self::from_reader(file, is_compressed)
    }

    pub fn restore(
        &mut self,
        anchor: &AbsoluteSystemPath,
    ) -> Result<Vec<AnchoredSystemPathBuf>, CacheError> {
        anchor.create_dir_all()?;

        let mut restored = Vec::new();
        let mut link_targets: HashMap<AnchoredSystemPathBuf, AnchoredSystemPathBuf> =
            HashMap::new();
        let mut archive = tar::Archive::new(&mut self.reader);

        let result = Self::restore_entries(&mut archive, anchor, &mut link_targets, &mut restored);
        if result.is_err() {
            for path in &restored {
                let _ = anchor.resolve(path).remove_file();
            }
        }
        result?;
        Ok(restored)
    }

    fn restore_entries<T: Read>(
        archive: &mut tar::Archive<T>,
        anchor: &AbsoluteSystemPath,
        link_targets: &mut HashMap<AnchoredSystemPathBuf, AnchoredSystemPathBuf>,
        restored: &mut Vec<AnchoredSystemPathBuf>,
    ) -> Result<(), CacheError> {
        for entry in archive.entries()? {
            let mut entry = entry?;
            let header = entry.header().clone();
            let entry_type = header.entry_type();

            let raw_path = entry.path()?.to_string_lossy().into_owned();
            let anchored = clean_anchored_path(&raw_path)?;

            let real_path = resolve_through_symlinks(link_targets, &anchored)?;
            let dest = anchor.resolve(&real_path);

            match entry_type {
                tar::EntryType::Directory => {
                    dest.create_dir_all()?;
                }
                tar::EntryType::Regular => {
                    if let Some(parent) = dest.parent() {
                        parent.create_dir_all()?;
                    }
                    let mut buf = Vec::with_capacity(header.size()? as usize);
                    entry.read_to_end(&mut buf)?;
                    dest.create_with_contents(&buf)?;
                    #[cfg(unix)]
                    dest.set_mode(header.mode()?)?;
                }
                tar::EntryType::Symlink => {
                    let link_name = entry
                        .link_name()?
                        .ok_or_else(|| CacheError::LinkTargetDoesNotExist(raw_path.clone()))?;
                    let link_name = link_name.to_string_lossy();

                    let parent = real_path
                        .as_str()
                        .rsplit_once('/')
                        .map(|(dir, _)| dir)
                        .unwrap_or("");
                    let combined = if parent.is_empty() {
                        link_name.clone().into_owned()
                    } else {
                        format!("{parent}/{link_name}")
                    };
                    let resolved_target = clean_anchored_path(&combined)?;

                    link_targets.insert(real_path.clone(), resolved_target.clone());
                    // Catch a cycle as soon as it closes rather than waiting for a descendant
                    // entry to walk into it.
                    resolve_through_symlinks(link_targets, &real_path)?;

                    if let Some(parent) = dest.parent() {
                        parent.create_dir_all()?;
                    }
                    let _ = dest.remove_file();

                    // The on-disk symlink keeps the archive's own relative target verbatim
                    // (it's resolved relative to the symlink's parent directory by the OS);
                    // `resolved_target` above exists only to validate containment and to
                    // remap entries nested under this symlink.
                    #[cfg(unix)]
                    dest.symlink_to_file(link_name.as_ref())?;
                    #[cfg(not(unix))]
                    return Err(CacheError::RestoreUnsupportedFileType(entry_type));
                }
                other => return Err(CacheError::RestoreUnsupportedFileType(other)),
            }

            restored.push(real_path);
        }
        Ok(())
    }
}

/// Lexically cleans a tar entry's path and rejects anything that would
/// escape the anchor once `..` components are resolved.
fn clean_anchored_path(raw: &str) -> Result<AnchoredSystemPathBuf, CacheError> {
    if raw.starts_with('/') || raw.contains(':') {
        return Err(CacheError::InvalidFilePath(raw.to_string()));
    }

    let mut stack: Vec<&str> = Vec::new();
    for component in raw.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(CacheError::LinkOutsideOfDirectory(raw.to_string()));
                }
            }
            other => stack.push(other),
        }
    }

    Ok(AnchoredSystemPathBuf::from_raw(stack.join("/")))
}

/// Follows `path` through any symlink prefixes recorded in `link_targets`
/// until it no longer starts with one, so a file nested under a symlinked
/// directory lands at the symlink's real destination on disk.
fn resolve_through_symlinks(
    link_targets: &HashMap<AnchoredSystemPathBuf, AnchoredSystemPathBuf>,
    path: &AnchoredSystemPathBuf,
) -> Result<AnchoredSystemPathBuf, CacheError> {
    let mut current = path.clone();
    let mut seen = HashSet::new();

    loop {
        if !seen.insert(current.clone()) {
            return Err(CacheError::CycleDetected);
        }

        if let Some(target) = link_targets.get(&current) {
            current = target.clone();
            continue;
        }

        let components: Vec<&str> = current.as_str().split('/').filter(|s| !s.is_empty()).collect();
        let mut replaced = false;
        for split in (1..components.len()).rev() {
            let prefix = AnchoredSystemPathBuf::from_raw(components[..split].join("/"));
            if let Some(target) = link_targets.get(&prefix) {
                let suffix = components[split..].join("/");
                let combined = if suffix.is_empty() {
                    target.to_string()
                } else {
                    format!("{target}/{suffix}")
                };
                current = clean_anchored_path(&combined)?;
                replaced = true;
                break;
            }
        }

        if !replaced {
            return Ok(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_paths() {
        assert!(clean_anchored_path("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_traversal_above_anchor() {
        assert!(clean_anchored_path("../escape").is_err());
        assert!(clean_anchored_path("one/../../escape").is_err());
    }

    #[test]
    fn cleans_redundant_components() {
        let cleaned = clean_anchored_path("one/./two/../two/file").unwrap();
        assert_eq!(cleaned.as_str(), "one/two/file");
    }

    #[test]
    fn resolves_chained_symlinks() {
        let mut targets = HashMap::new();
        targets.insert(
            AnchoredSystemPathBuf::from_raw("a"),
            AnchoredSystemPathBuf::from_raw("b"),
        );
        targets.insert(
            AnchoredSystemPathBuf::from_raw("b"),
            AnchoredSystemPathBuf::from_raw("c"),
        );
        let resolved =
            resolve_through_symlinks(&targets, &AnchoredSystemPathBuf::from_raw("a/file")).unwrap();
        assert_eq!(resolved.as_str(), "c/file");
    }

    #[test]
    fn detects_symlink_cycle() {
        let mut targets = HashMap::new();
        targets.insert(
            AnchoredSystemPathBuf::from_raw("a"),
            AnchoredSystemPathBuf::from_raw("b"),
        );
        targets.insert(
            AnchoredSystemPathBuf::from_raw("b"),
            AnchoredSystemPathBuf::from_raw("a"),
        );
        assert!(matches!(
            resolve_through_symlinks(&targets, &AnchoredSystemPathBuf::from_raw("a")),
            Err(CacheError::CycleDetected)
        ));
    }
}
