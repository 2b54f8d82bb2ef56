use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::path::Path;

/// An uploaded image ready for transport: base64 data plus its declared media type.
///
/// The bytes are never inspected. Format and size limits are the recognition service's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: String,
    media_type: String,
    digest: String,
    byte_len: usize,
}

impl ImagePayload {
    pub fn from_bytes(bytes: &[u8], media_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            media_type: media_type.into(),
            digest: short_digest(bytes),
            byte_len: bytes.len(),
        }
    }

    /// Read an image from disk, inferring the media type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let media_type = media_type_for_path(path);
        Ok(Self::from_bytes(&bytes, media_type))
    }

    /// Base64 (standard alphabet, padded).
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// First 12 hex chars of the SHA-256 of the raw bytes. Log correlation only.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}

fn short_digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    let mut hex = hex::encode(hash);
    hex.truncate(12);
    hex
}
