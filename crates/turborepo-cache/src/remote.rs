//! Remote cache backend talking directly to the artifact HTTP API: `PUT`
//! uploads an archive, `HEAD` checks existence without downloading, `GET`
//! downloads and restores it. A `403` whose body carries a
//! `remote_caching_*` error code permanently downgrades this backend so the
//! rest of the run stops paying for failed round trips; any other `403`
//! (an expired or invalid token) is reported as a fatal error instead of
//! being mistaken for a caching-disabled response.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use turbopath::{AbsoluteSystemPath, AnchoredSystemPathBuf};

use crate::{
    cache_archive::{CacheReader, CacheWriter},
    error::{CacheError, CacheHitMetadata, CacheSource},
    signature::ArtifactSignatureAuthenticator,
};

#[derive(Clone)]
pub struct RemoteCacheOpts {
    pub api_url: String,
    pub token: String,
    pub team_id: String,
    pub team_slug: Option<String>,
    pub signature_key: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

/// Cheaply cloneable: every clone shares the same `disabled` flag, so a
/// `403` observed by one clone permanently downgrades all of them.
#[derive(Clone)]
pub struct RemoteCache {
    client: Client,
    opts: Arc<RemoteCacheOpts>,
    signer: Option<ArtifactSignatureAuthenticator>,
    disabled: Arc<AtomicBool>,
}

impl RemoteCache {
    pub fn new(client: Client, opts: RemoteCacheOpts) -> Self {
        let signer = opts
            .signature_key
            .clone()
            .map(|key| ArtifactSignatureAuthenticator::new(opts.team_id.clone().into_bytes(), Some(key)));
        RemoteCache {
            client,
            opts: Arc::new(opts),
            signer,
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    fn artifact_url(&self, hash: &str) -> String {
        let mut url = format!(
            "{}/v8/artifacts/{hash}?teamId={}",
            self.opts.api_url, self.opts.team_id
        );
        if let Some(slug) = &self.opts.team_slug {
            url.push_str(&format!("&slug={slug}"));
        }
        url
    }

    /// Classifies a `403` response body: a `remote_caching_*` error code
    /// downgrades this backend (warning exactly once, regardless of which
    /// method observed the transition first); anything else — an
    /// expired or invalid token, most commonly — is a fatal error.
    async fn handle_forbidden(&self, response: Response) -> Result<(), CacheError> {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(ApiErrorBody { error }) if error.code.starts_with("remote_caching_") => {
                self.disable(&error.message);
                Ok(())
            }
            Ok(ApiErrorBody { error }) => Err(CacheError::RemoteUnauthorized(format!(
                "{}: {}",
                error.code, error.message
            ))),
            Err(_) => Err(CacheError::RemoteUnauthorized(
                "remote cache rejected the request with an unrecognized 403 body".to_string(),
            )),
        }
    }

    fn disable(&self, message: &str) {
        let was_disabled = self.disabled.swap(true, Ordering::Relaxed);
        if !was_disabled {
            tracing::warn!("remote caching disabled for the remainder of this run: {message}");
        }
    }

    pub async fn put(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
        files: &[AnchoredSystemPathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        if self.is_disabled() {
            return Ok(());
        }

        let mut body: Vec<u8> = Vec::new();
        {
            let mut writer = CacheWriter::from_writer(&mut body, true)?;
            for file in files {
                writer.add_file(anchor, file)?;
            }
            writer.finish()?;
        }

        let mut request = self
            .client
            .put(self.artifact_url(hash))
            .bearer_auth(&self.opts.token)
            .header("x-artifact-duration", duration_ms.to_string())
            .header("Content-Type", "application/octet-stream");

        if let Some(signer) = &self.signer {
            let tag = signer.generate_tag(hash, &body)?;
            request = request.header("x-artifact-tag", tag);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return self.handle_forbidden(response).await;
        }
        if !status.is_success() {
            return Err(CacheError::Remote(
                response.error_for_status().unwrap_err(),
            ));
        }
        Ok(())
    }

    pub async fn exists(&self, hash: &str) -> Result<Option<CacheHitMetadata>, CacheError> {
        if self.is_disabled() {
            return Ok(None);
        }

        let response = self
            .client
            .head(self.artifact_url(hash))
            .bearer_auth(&self.opts.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            self.handle_forbidden(response).await?;
            return Ok(None);
        }
        if !status.is_success() {
            return Ok(None);
        }

        let time_saved = duration_header(&response);
        Ok(Some(CacheHitMetadata {
            source: CacheSource::Remote,
            time_saved,
        }))
    }

    pub async fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(CacheHitMetadata, Vec<AnchoredSystemPathBuf>)>, CacheError> {
        if self.is_disabled() {
            return Ok(None);
        }

        let response = self
            .client
            .get(self.artifact_url(hash))
            .bearer_auth(&self.opts.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            self.handle_forbidden(response).await?;
            return Ok(None);
        }
        if !status.is_success() {
            return Ok(None);
        }

        let time_saved = duration_header(&response);
        let expected_tag = response
            .headers()
            .get("x-artifact-tag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;

        if let (Some(signer), Some(expected_tag)) = (&self.signer, &expected_tag) {
            signer
                .validate(hash, &body, expected_tag)
                .map_err(|_| CacheError::InvalidSignature)?;
        }

        let mut reader = CacheReader::from_reader(std::io::Cursor::new(body), true)?;
        let files = reader.restore(anchor)?;

        Ok(Some((
            CacheHitMetadata {
                source: CacheSource::Remote,
                time_saved,
            },
            files,
        )))
    }
}

fn duration_header(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("x-artifact-duration")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
