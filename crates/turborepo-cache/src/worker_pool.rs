//! Bounds the number of in-flight remote write-throughs so a run with many
//! small, fast tasks doesn't open an unbounded number of upload connections.
//! `put` blocks only when the pool is already full; `shutdown` waits for
//! whatever is still outstanding, up to a deadline, so the process doesn't
//! hang forever on a stalled upload. Local writes never go through here —
//! they happen synchronously on the caller's thread, this pool only exists
//! to keep remote uploads off the critical path.

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use turbopath::{AbsoluteSystemPathBuf, AnchoredSystemPathBuf};

use crate::remote::RemoteCache;

pub struct AsyncCache {
    workers: FuturesUnordered<JoinHandle<()>>,
    max_workers: usize,
    remote: RemoteCache,
}

impl AsyncCache {
    pub fn new(remote: RemoteCache, max_workers: usize) -> Self {
        AsyncCache {
            workers: FuturesUnordered::new(),
            max_workers: max_workers.max(1),
            remote,
        }
    }

    pub async fn put(
        &mut self,
        anchor: AbsoluteSystemPathBuf,
        hash: String,
        files: Vec<AnchoredSystemPathBuf>,
        duration_ms: u64,
    ) {
        if self.workers.len() >= self.max_workers {
            self.workers.next().await;
        }

        let remote = self.remote.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = remote.put(&anchor, &hash, &files, duration_ms).await {
                tracing::warn!("remote cache write-through for {hash} failed: {err}");
            }
        });
        self.workers.push(handle);
    }

    /// Waits for pending writes, up to `deadline`. Anything still running
    /// after that is abandoned: the run has already reported its own exit
    /// code, and a slow upload isn't worth blocking process exit over.
    pub async fn shutdown(mut self, deadline: std::time::Duration) {
        let drain = async {
            while self.workers.next().await.is_some() {}
        };
        let _ = tokio::time::timeout(deadline, drain).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteCacheOpts;

    fn test_remote() -> RemoteCache {
        RemoteCache::new(
            reqwest::Client::new(),
            RemoteCacheOpts {
                api_url: "http://localhost".to_string(),
                token: "token".to_string(),
                team_id: "team".to_string(),
                team_slug: None,
                signature_key: None,
            },
        )
    }

    #[test]
    fn max_workers_is_never_zero() {
        let pool = AsyncCache::new(test_remote(), 0);
        assert_eq!(pool.max_workers, 1);
    }
}
