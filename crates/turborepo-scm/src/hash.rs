use sha1::{Digest, Sha1};

/// Hashes `contents` the same way git hashes a blob object, so the result
/// is identical to `git hash-object` on the same bytes regardless of
/// whether the file is actually tracked.
pub fn git_blob_hash(contents: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(b"blob ");
    hasher.update(contents.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(contents);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_git_blob_hash() {
        // `git hash-object` on a file containing just "hello\n"
        assert_eq!(
            git_blob_hash(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464"
        );
    }

    #[test]
    fn empty_file_hash() {
        assert_eq!(
            git_blob_hash(b""),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }
}
