//! Photo and video evidence validation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DomainError, DomainResult};
use crate::text;

pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;
pub const CAPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Photo,
    Video,
}

text_enum!(EvidenceKind {
    Photo => "photo",
    Video => "video",
});

const ACCEPTED: &[(&str, EvidenceKind)] = &[
    ("image/jpeg", EvidenceKind::Photo),
    ("image/png", EvidenceKind::Photo),
    ("image/webp", EvidenceKind::Photo),
    ("image/heic", EvidenceKind::Photo),
    ("video/mp4", EvidenceKind::Video),
    ("video/webm", EvidenceKind::Video),
    ("video/quicktime", EvidenceKind::Video),
];

/// Kind for an accepted MIME type
pub fn kind_for_mime(mime: &str) -> Option<EvidenceKind> {
    let mime = mime.trim().to_ascii_lowercase();
    ACCEPTED
        .iter()
        .find(|(accepted, _)| *accepted == mime)
        .map(|(_, kind)| *kind)
}

/// Guess the media family from leading bytes
fn sniff(data: &[u8]) -> Option<EvidenceKind> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) || data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(EvidenceKind::Photo);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(EvidenceKind::Photo);
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        // EBML header (webm / mkv)
        return Some(EvidenceKind::Video);
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        let brand = &data[8..12];
        return if brand.starts_with(b"hei") || brand == b"mif1" {
            Some(EvidenceKind::Photo)
        } else {
            Some(EvidenceKind::Video)
        };
    }
    None
}

/// An upload that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedUpload {
    pub kind: EvidenceKind,
    pub mime_type: String,
    pub file_name: String,
    pub sha256: String,
    pub caption: Option<String>,
}

/// Validate an upload against the accepted types and the size limit
pub fn check_upload(
    file_name: &str,
    mime_type: &str,
    caption: Option<&str>,
    data: &[u8],
    max_bytes: usize,
) -> DomainResult<CheckedUpload> {
    let kind = kind_for_mime(mime_type).ok_or_else(|| {
        DomainError::validation(format!("Unsupported file type '{}'", mime_type.trim()))
    })?;

    if data.is_empty() {
        return Err(DomainError::validation("File is empty"));
    }
    if data.len() > max_bytes {
        return Err(DomainError::validation(format!(
            "File exceeds the limit of {} MiB",
            max_bytes / (1024 * 1024)
        )));
    }

    match sniff(data) {
        Some(actual) if actual == kind => {}
        _ => {
            return Err(DomainError::validation(format!(
                "File content does not look like a {kind}"
            )))
        }
    }

    Ok(CheckedUpload {
        kind,
        mime_type: mime_type.trim().to_ascii_lowercase(),
        file_name: text::sanitize_file_name(file_name),
        sha256: content_hash(data),
        caption: text::optional_line("Caption", caption, CAPTION_MAX_CHARS)?,
    })
}

/// SHA-256 hex digest of the file content
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    fn mp4() -> Vec<u8> {
        let mut v = vec![0, 0, 0, 0x18];
        v.extend_from_slice(b"ftypisom");
        v.extend_from_slice(&[0; 8]);
        v
    }

    #[test]
    fn accepts_matching_photo() {
        let up = check_upload("IMG 1.jpg", "Image/JPEG", Some(" Tür "), JPEG, 1024).unwrap();
        assert_eq!(up.kind, EvidenceKind::Photo);
        assert_eq!(up.mime_type, "image/jpeg");
        assert_eq!(up.file_name, "IMG_1.jpg");
        assert_eq!(up.caption.as_deref(), Some("Tür"));
        assert_eq!(up.sha256.len(), 64);
    }

    #[test]
    fn accepts_video() {
        let up = check_upload("clip.mp4", "video/mp4", None, &mp4(), 1024).unwrap();
        assert_eq!(up.kind, EvidenceKind::Video);
    }

    #[test]
    fn rejects_unknown_type_empty_and_oversize() {
        assert!(check_upload("a.pdf", "application/pdf", None, b"%PDF-", 1024).is_err());
        assert!(check_upload("a.jpg", "image/jpeg", None, b"", 1024).is_err());
        assert!(check_upload("a.jpg", "image/jpeg", None, JPEG, 4).is_err());
    }

    #[test]
    fn rejects_mismatched_content() {
        assert!(check_upload("a.mp4", "video/mp4", None, JPEG, 1024).is_err());
        assert!(check_upload("a.png", "image/png", None, b"not an image", 1024).is_err());
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
