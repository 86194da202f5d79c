//! Combines the local and remote backends behind one read interface.
//! `fetch` checks local first and writes any remote hit back to local so
//! the next fetch for the same hash never leaves the machine. Puts are
//! handled separately by `TaskCache`, which writes local synchronously and
//! hands the remote write-through to a bounded worker pool.

use tracing::warn;
use turbopath::{AbsoluteSystemPath, AnchoredSystemPathBuf};

use crate::{
    error::{CacheError, CacheHitMetadata},
    local::LocalCache,
    remote::RemoteCache,
};

pub struct CacheMultiplexer {
    local: Option<LocalCache>,
    remote: Option<RemoteCache>,
}

impl CacheMultiplexer {
    pub fn new(local: Option<LocalCache>, remote: Option<RemoteCache>) -> Self {
        if local.is_none() && remote.is_none() {
            warn!("no caches are enabled");
        }
        CacheMultiplexer { local, remote }
    }

    /// Local-only existence probe, used by dry-run projection. Never touches
    /// the remote: the caller wants an answer without paying for a round
    /// trip or a download.
    pub fn exists(&self, hash: &str) -> Option<CacheHitMetadata> {
        self.local.as_ref().and_then(|local| local.exists(hash))
    }

    pub async fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(CacheHitMetadata, Vec<AnchoredSystemPathBuf>)>, CacheError> {
        if let Some(local) = &self.local {
            if let Some(hit) = local.fetch(anchor, hash)? {
                return Ok(Some(hit));
            }
        }

        let Some(remote) = &self.remote else {
            return Ok(None);
        };

        let result = remote.fetch(anchor, hash).await?;

        let Some((metadata, files)) = result else {
            return Ok(None);
        };

        if let Some(local) = &self.local {
            local.put(anchor, hash, &files, metadata.time_saved)?;
        }

        Ok(Some((metadata, files)))
    }

    pub fn local(&self) -> Option<&LocalCache> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&RemoteCache> {
        self.remote.as_ref()
    }
}
