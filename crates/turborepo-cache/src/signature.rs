//! Optional HMAC-SHA256 signing of artifacts sent to or received from the
//! remote cache. The tag covers the task hash and team id alongside the
//! archive body so a byte-identical artifact uploaded under a different
//! team can't be replayed as a hit.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("no signature secret key available")]
    NoSecretKey,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("signature is not valid base64: {0}")]
    MalformedBase64(#[from] base64::DecodeError),
    #[error("signature does not match artifact body")]
    Invalid,
}

#[derive(Clone)]
pub struct ArtifactSignatureAuthenticator {
    team_id: Vec<u8>,
    secret_key_override: Option<Vec<u8>>,
}

impl ArtifactSignatureAuthenticator {
    pub fn new(team_id: Vec<u8>, secret_key_override: Option<Vec<u8>>) -> Self {
        Self {
            team_id,
            secret_key_override,
        }
    }

    fn secret_key(&self) -> Result<Vec<u8>, SignatureError> {
        if let Some(key) = &self.secret_key_override {
            return Ok(key.clone());
        }
        std::env::var("TURBO_REMOTE_CACHE_SIGNATURE_KEY")
            .map(|k| k.into_bytes())
            .map_err(|_| SignatureError::NoSecretKey)
    }

    fn construct_metadata(&self, hash: &str) -> Vec<u8> {
        let mut metadata = hash.as_bytes().to_vec();
        metadata.extend_from_slice(&self.team_id);
        metadata
    }

    fn mac_for(&self, hash: &str, artifact_body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let secret_key = self.secret_key()?;
        let mut mac =
            HmacSha256::new_from_slice(&secret_key).map_err(|_| SignatureError::InvalidSecretKey)?;
        mac.update(&self.construct_metadata(hash));
        mac.update(artifact_body);
        Ok(mac)
    }

    pub fn generate_tag(&self, hash: &str, artifact_body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac_for(hash, artifact_body)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    pub fn validate(
        &self,
        hash: &str,
        artifact_body: &[u8],
        expected_tag: &str,
    ) -> Result<(), SignatureError> {
        let mac = self.mac_for(hash, artifact_body)?;
        let expected_bytes = STANDARD.decode(expected_tag)?;
        mac.verify_slice(&expected_bytes)
            .map_err(|_| SignatureError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_tag() {
        let auth = ArtifactSignatureAuthenticator::new(b"team_123".to_vec(), Some(b"secret".to_vec()));
        let tag = auth.generate_tag("abc123", b"artifact body").unwrap();
        assert!(auth.validate("abc123", b"artifact body", &tag).is_ok());
    }

    #[test]
    fn rejects_a_tag_for_a_different_body() {
        let auth = ArtifactSignatureAuthenticator::new(b"team_123".to_vec(), Some(b"secret".to_vec()));
        let tag = auth.generate_tag("abc123", b"artifact body").unwrap();
        assert!(matches!(
            auth.validate("abc123", b"different body", &tag),
            Err(SignatureError::Invalid)
        ));
    }

    #[test]
    fn rejects_a_tag_for_a_different_team() {
        let team_a = ArtifactSignatureAuthenticator::new(b"team_a".to_vec(), Some(b"secret".to_vec()));
        let team_b = ArtifactSignatureAuthenticator::new(b"team_b".to_vec(), Some(b"secret".to_vec()));
        let tag = team_a.generate_tag("abc123", b"artifact body").unwrap();
        assert!(team_b.validate("abc123", b"artifact body", &tag).is_err());
    }

    #[test]
    fn missing_secret_key_is_an_error() {
        let auth = ArtifactSignatureAuthenticator::new(b"team_123".to_vec(), None);
        std::env::remove_var("TURBO_REMOTE_CACHE_SIGNATURE_KEY");
        assert!(matches!(
            auth.generate_tag("abc123", b"body"),
            Err(SignatureError::NoSecretKey)
        ));
    }
}
