//! Content-addressed run cache. A task's output files, its log, and a
//! `{duration_ms, hash}` metadata sidecar are archived together under its
//! task hash; [`TaskCache`] presents one interface over whichever backends
//! (local disk, remote HTTP, or both) are configured for the run.

mod cache_archive;
mod error;
mod local;
mod multiplexer;
mod remote;
mod signature;
mod worker_pool;

use std::{collections::HashSet, time::Duration};

use tokio::sync::Mutex as AsyncMutex;
use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};

pub use crate::{
    cache_archive::{CacheReader, CacheWriter},
    error::{CacheError, CacheHitMetadata, CacheSource},
    remote::RemoteCacheOpts,
    signature::SignatureError,
};
use crate::{local::LocalCache, multiplexer::CacheMultiplexer, remote::RemoteCache, worker_pool::AsyncCache};

#[derive(Debug, Clone)]
pub struct CacheOpts {
    pub cache_dir: String,
    pub remote_cache_read_only: bool,
    pub skip_remote: bool,
    pub skip_filesystem: bool,
    pub workers: usize,
    pub shutdown_deadline: Duration,
}

impl Default for CacheOpts {
    fn default() -> Self {
        CacheOpts {
            cache_dir: ".turbo/cache".to_string(),
            remote_cache_read_only: false,
            skip_remote: false,
            skip_filesystem: false,
            workers: num_cpus::get(),
            shutdown_deadline: Duration::from_secs(30),
        }
    }
}

/// Per-run facade: `exists`/`fetch` are cheap local-or-remote reads,
/// `put` is fire-and-confirm for local but never blocks the caller on the
/// remote upload, and `shutdown` is the one place that waits for pending
/// uploads to land (or gives up at the deadline).
pub struct TaskCache {
    repo_root: AbsoluteSystemPathBuf,
    multiplexer: CacheMultiplexer,
    remote_writer: Option<AsyncMutex<AsyncCache>>,
    remote_read_only: bool,
    puts_started: std::sync::Mutex<HashSet<String>>,
    shutdown_deadline: Duration,
}

impl TaskCache {
    pub fn new(
        opts: CacheOpts,
        repo_root: &AbsoluteSystemPath,
        remote_opts: Option<RemoteCacheOpts>,
        http_client: reqwest::Client,
    ) -> Result<Self, CacheError> {
        let local = (!opts.skip_filesystem)
            .then(|| LocalCache::new(&opts.cache_dir, repo_root))
            .transpose()?;

        let remote = if opts.skip_remote {
            None
        } else {
            remote_opts.map(|ro| RemoteCache::new(http_client, ro))
        };

        let remote_writer = if opts.remote_cache_read_only {
            None
        } else {
            remote
                .clone()
                .map(|remote| AsyncMutex::new(AsyncCache::new(remote, opts.workers)))
        };

        let multiplexer = CacheMultiplexer::new(local, remote);

        Ok(TaskCache {
            repo_root: repo_root.to_owned(),
            multiplexer,
            remote_writer,
            remote_read_only: opts.remote_cache_read_only,
            puts_started: std::sync::Mutex::new(HashSet::new()),
            shutdown_deadline: opts.shutdown_deadline,
        })
    }

    pub fn exists(&self, hash: &str) -> Option<CacheHitMetadata> {
        self.multiplexer.exists(hash)
    }

    pub async fn fetch(
        &self,
        hash: &str,
    ) -> Result<Option<(CacheHitMetadata, Vec<AnchoredSystemPathBuf>)>, CacheError> {
        self.multiplexer.fetch(&self.repo_root, hash).await
    }

    /// Writes local synchronously, then enqueues (at most once per hash) a
    /// remote write-through that runs on the worker pool. A second `put`
    /// for a hash already written this process is a no-op.
    pub async fn put(
        &self,
        hash: &str,
        files: Vec<AnchoredSystemPathBuf>,
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        {
            let mut started = self.puts_started.lock().unwrap();
            if !started.insert(hash.to_string()) {
                return Ok(());
            }
        }

        if let Some(local) = self.multiplexer.local() {
            local.put(&self.repo_root, hash, &files, duration_ms)?;
        }

        if self.remote_read_only {
            return Ok(());
        }

        if let Some(remote_writer) = &self.remote_writer {
            let mut pool = remote_writer.lock().await;
            pool.put(self.repo_root.clone(), hash.to_string(), files, duration_ms)
                .await;
        }

        Ok(())
    }

    pub async fn shutdown(self) {
        if let Some(remote_writer) = self.remote_writer {
            remote_writer
                .into_inner()
                .shutdown(self.shutdown_deadline)
                .await;
        }
    }
}
