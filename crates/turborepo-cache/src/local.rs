//! On-disk cache backend: one `{hash}.tar.zst` archive plus a
//! `{hash}-meta.json` sidecar per task, both written via write-to-temp-
//! then-rename so a reader never observes a half-written entry.

use serde::{Deserialize, Serialize};
use tracing::debug;
use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};

use crate::{
    cache_archive::{CacheReader, CacheWriter},
    error::{CacheError, CacheHitMetadata, CacheSource},
};

pub struct LocalCache {
    cache_directory: AbsoluteSystemPathBuf,
}

#[derive(Debug, Deserialize, Serialize)]
struct CacheMetadata {
    hash: String,
    duration: u64,
}

impl CacheMetadata {
    fn read(path: &AbsoluteSystemPath) -> Result<CacheMetadata, CacheError> {
        serde_json::from_str(&path.read_to_string()?).map_err(CacheError::InvalidMetadata)
    }
}

impl LocalCache {
    pub fn new(
        cache_dir: &str,
        repo_root: &AbsoluteSystemPath,
    ) -> Result<Self, CacheError> {
        let cache_directory = AbsoluteSystemPathBuf::from_unknown(repo_root, cache_dir);
        debug!("local cache directory resolved to {}", cache_directory);
        cache_directory.create_dir_all()?;
        Ok(LocalCache { cache_directory })
    }

    fn archive_path(&self, hash: &str) -> AbsoluteSystemPathBuf {
        self.cache_directory.join_component(&format!("{hash}.tar.zst"))
    }

    fn metadata_path(&self, hash: &str) -> AbsoluteSystemPathBuf {
        self.cache_directory
            .join_component(&format!("{hash}-meta.json"))
    }

    pub fn exists(&self, hash: &str) -> Option<CacheHitMetadata> {
        if !self.archive_path(hash).exists() {
            return None;
        }
        let time_saved = CacheMetadata::read(&self.metadata_path(hash))
            .map(|meta| meta.duration)
            .unwrap_or(0);
        Some(CacheHitMetadata {
            source: CacheSource::Local,
            time_saved,
        })
    }

    pub fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(CacheHitMetadata, Vec<AnchoredSystemPathBuf>)>, CacheError> {
        let archive_path = self.archive_path(hash);
        if !archive_path.exists() {
            debug!("local cache miss for {hash}");
            return Ok(None);
        }

        let mut reader = CacheReader::open(&archive_path)?;
        let restored_files = reader.restore(anchor)?;
        let meta = CacheMetadata::read(&self.metadata_path(hash))?;

        Ok(Some((
            CacheHitMetadata {
                source: CacheSource::Local,
                time_saved: meta.duration,
            },
            restored_files,
        )))
    }

    pub fn put(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
        files: &[AnchoredSystemPathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        let archive_path = self.archive_path(hash);
        let mut writer = CacheWriter::create(&archive_path)?;
        for file in files {
            writer.add_file(anchor, file)?;
        }
        writer.finish()?;

        let meta = CacheMetadata {
            hash: hash.to_string(),
            duration: duration_ms,
        };
        let meta_json = serde_json::to_string(&meta).map_err(CacheError::InvalidMetadata)?;

        let temp_metadata_path = self
            .cache_directory
            .join_component(&format!(".{hash}-meta.json.{}.tmp", std::process::id()));
        temp_metadata_path.create_with_contents(&meta_json)?;
        temp_metadata_path.rename(&self.metadata_path(hash))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use turbopath::AnchoredSystemPathBuf;

    use super::*;

    #[test]
    fn round_trips_through_local_disk() -> Result<(), CacheError> {
        let repo_dir = tempdir().unwrap();
        let repo_root = AbsoluteSystemPathBuf::new(repo_dir.path().to_str().unwrap())?;

        let file = AnchoredSystemPathBuf::from_raw("out/result.txt");
        repo_root.resolve(&file).parent().unwrap().create_dir_all()?;
        repo_root.resolve(&file).write("task output")?;

        let cache = LocalCache::new(".turbo/cache", &repo_root)?;
        assert!(cache.exists("task-hash").is_none());

        cache.put(&repo_root, "task-hash", &[file.clone()], 42)?;
        assert!(cache.exists("task-hash").is_some());

        let restore_dir = tempdir().unwrap();
        let restore_root = AbsoluteSystemPathBuf::new(restore_dir.path().to_str().unwrap())?;
        let (metadata, restored) = cache.fetch(&restore_root, "task-hash")?.unwrap();

        assert_eq!(metadata.time_saved, 42);
        assert_eq!(restored.len(), 1);
        assert_eq!(
            restore_root.resolve(&file).read_to_string()?,
            "task output"
        );
        Ok(())
    }

    #[test]
    fn fetch_reports_miss_for_unknown_hash() -> Result<(), CacheError> {
        let repo_dir = tempdir().unwrap();
        let repo_root = AbsoluteSystemPathBuf::new(repo_dir.path().to_str().unwrap())?;
        let cache = LocalCache::new(".turbo/cache", &repo_root)?;
        assert!(cache.fetch(&repo_root, "missing")?.is_none());
        Ok(())
    }
}
