//! Embedding cache abstraction and implementations.
//!
//! Embeddings are cached by content, never by document identity: the key is a
//! 256-bit BLAKE3 fingerprint of the UTF-8 text, so two identical sections from
//! different articles share one entry. Vectors are stored as a versioned
//! little-endian blob (see [`encode_vector`]).

pub mod sqlite;

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// The cache has been closed
    #[error("Cache is closed")]
    Closed,

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Current vector blob layout version.
pub const BLOB_VERSION: u8 = 1;

const BLOB_HEADER_LEN: usize = 5;

/// Persistent text-to-vector cache.
///
/// Implementations must tolerate concurrent `get`/`put` from many threads.
/// Concurrent `put` for the same text is last-writer-wins.
pub trait EmbeddingCache: Send + Sync {
    /// Look up the vector stored for `text`, if any.
    fn get(&self, text: &str) -> StorageResult<Option<Vec<f32>>>;

    /// Store `vector` for `text`, replacing any previous entry.
    fn put(&self, text: &str, vector: &[f32]) -> StorageResult<()>;

    /// Release the underlying storage handle. Calling it again is a no-op.
    fn close(&self) -> StorageResult<()>;
}

/// Hex-encoded BLAKE3 hash of the UTF-8 bytes of `text` (64 characters).
pub fn fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Serialize a vector as `[version:u8][len:u32 LE][f32 LE; len]`.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(BLOB_HEADER_LEN + vector.len() * 4);
    bytes.push(BLOB_VERSION);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_vector`].
///
/// # Errors
/// Returns `StorageError::SerializationError` on an unknown version or a
/// length that disagrees with the header.
pub fn decode_vector(bytes: &[u8]) -> StorageResult<Vec<f32>> {
    if bytes.len() < BLOB_HEADER_LEN {
        return Err(StorageError::SerializationError(format!(
            "vector blob too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[0] != BLOB_VERSION {
        return Err(StorageError::SerializationError(format!(
            "unsupported vector blob version {}",
            bytes[0]
        )));
    }

    let declared = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let payload = &bytes[BLOB_HEADER_LEN..];
    if payload.len() != declared * 4 {
        return Err(StorageError::SerializationError(format!(
            "vector blob declares {} values but holds {} bytes",
            declared,
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_fixed_width_hex() {
        let fp = fingerprint("tumor metabolism");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint("tumor metabolism"));
    }

    #[test]
    fn test_distinct_texts_have_distinct_fingerprints() {
        let texts = [
            "",
            " ",
            "Methods",
            "methods",
            "Methods ",
            "Glycolysis is elevated in tumors.",
            "Glycolysis is elevated in tumours.",
        ];
        let mut seen = std::collections::HashSet::new();
        for text in texts {
            assert!(seen.insert(fingerprint(text)), "collision for {:?}", text);
        }
    }

    #[test]
    fn test_vector_blob_roundtrip_is_bitwise() {
        let vector = vec![1.0f32, -0.25, 3.5e-8, 0.0, f32::MIN_POSITIVE];
        let decoded = decode_vector(&encode_vector(&vector)).unwrap();
        assert_eq!(
            decoded.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            vector.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_vector_blob() {
        let bytes = encode_vector(&[]);
        assert_eq!(bytes.len(), 5);
        assert!(decode_vector(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_blobs() {
        assert!(decode_vector(&[1, 0]).is_err());

        let mut wrong_version = encode_vector(&[1.0]);
        wrong_version[0] = 9;
        assert!(decode_vector(&wrong_version).is_err());

        let mut truncated = encode_vector(&[1.0, 2.0]);
        truncated.pop();
        assert!(decode_vector(&truncated).is_err());
    }
}
