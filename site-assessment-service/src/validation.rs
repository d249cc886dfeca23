use thiserror::Error;

use crate::models::UploadedAsset;

const MEBIBYTE: usize = 1024 * 1024;

/// MIME types accepted from the upload form: 3D model containers and still images.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "model/gltf-binary",
    "model/gltf+json",
    // browsers report .glb and most other binary model files this way
    "application/octet-stream",
    "application/x-blender",
    "application/x-maya",
    "application/x-3ds",
    "application/x-stl",
    "application/obj",
    "application/fbx",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files uploaded")]
    NoFile,

    #[error(
        "Invalid file type. Only 3D model files (GLTF, GLB, OBJ, etc.) and images (JPG, PNG) are allowed."
    )]
    UnsupportedType { mime_type: String },

    #[error("File too large. Maximum size is {}MB.", .max_bytes / MEBIBYTE)]
    TooLarge { max_bytes: usize },

    #[error("Too many files. Maximum is {max_files} files per request.")]
    TooManyFiles { max_files: usize },
}

/// Reduces a declared content type to its lowercase `type/subtype` essence,
/// dropping any parameters.
pub fn normalize_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&normalize_mime_type(mime_type).as_str())
}

/// Per-file limits applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_size_bytes: usize,
    pub max_files: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 100 * MEBIBYTE,
            max_files: 10,
        }
    }
}

impl UploadPolicy {
    /// Returns None when the ceiling does not fit in a byte count.
    pub fn from_megabytes(max_file_size_mb: usize, max_files: usize) -> Option<Self> {
        Some(Self {
            max_file_size_bytes: max_file_size_mb.checked_mul(MEBIBYTE)?,
            max_files,
        })
    }

    /// Upper bound for a whole request body: every file at its ceiling plus room
    /// for the text fields and multipart framing.
    pub fn body_limit_bytes(&self) -> usize {
        self.max_file_size_bytes
            .saturating_mul(self.max_files)
            .saturating_add(MEBIBYTE)
    }

    pub fn check_type(&self, mime_type: &str) -> Result<(), ValidationError> {
        if is_allowed_mime_type(mime_type) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedType {
                mime_type: mime_type.to_string(),
            })
        }
    }

    pub fn check_size(&self, size_bytes: usize) -> Result<(), ValidationError> {
        if size_bytes > self.max_file_size_bytes {
            return Err(ValidationError::TooLarge {
                max_bytes: self.max_file_size_bytes,
            });
        }
        Ok(())
    }

    pub fn check_count(&self, file_count: usize) -> Result<(), ValidationError> {
        if file_count > self.max_files {
            return Err(ValidationError::TooManyFiles {
                max_files: self.max_files,
            });
        }
        Ok(())
    }

    /// Validates a complete upload set. The first offending file decides the error.
    pub fn validate(&self, assets: &[UploadedAsset]) -> Result<(), ValidationError> {
        if assets.is_empty() {
            return Err(ValidationError::NoFile);
        }
        self.check_count(assets.len())?;

        for asset in assets {
            self.check_type(&asset.declared_mime_type)?;
            self.check_size(asset.size_bytes)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, mime: &str, size: usize) -> UploadedAsset {
        UploadedAsset::new(name, mime, vec![0u8; size])
    }

    #[test]
    fn accepts_images_and_models() {
        for mime in [
            "image/jpeg",
            "image/png",
            "image/webp",
            "model/gltf-binary",
            "application/octet-stream",
            "application/x-stl",
        ] {
            assert!(is_allowed_mime_type(mime), "{mime} should be allowed");
        }
    }

    #[test]
    fn mime_matching_ignores_case_and_parameters() {
        assert!(is_allowed_mime_type("IMAGE/PNG"));
        assert!(is_allowed_mime_type("model/gltf+json; charset=utf-8"));
    }

    #[test]
    fn normalizes_to_bare_essence() {
        assert_eq!(normalize_mime_type("IMAGE/PNG; charset=binary"), "image/png");
        assert_eq!(normalize_mime_type(" image/jpeg "), "image/jpeg");
    }

    #[test]
    fn megabyte_overflow_is_rejected() {
        assert!(UploadPolicy::from_megabytes(usize::MAX, 10).is_none());
        assert_eq!(
            UploadPolicy::from_megabytes(1, 3),
            Some(UploadPolicy {
                max_file_size_bytes: MEBIBYTE,
                max_files: 3,
            })
        );
    }

    #[test]
    fn rejects_types_outside_allow_list() {
        for mime in ["application/zip", "text/plain", "image/gif", "video/mp4", ""] {
            assert!(!is_allowed_mime_type(mime), "{mime} should be rejected");
        }
    }

    #[test]
    fn empty_set_is_no_file() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.validate(&[]), Err(ValidationError::NoFile));
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        let policy = UploadPolicy {
            max_file_size_bytes: 1024,
            max_files: 10,
        };
        assert!(policy.validate(&[asset("a.png", "image/png", 1024)]).is_ok());
        assert_eq!(
            policy.validate(&[asset("a.png", "image/png", 1025)]),
            Err(ValidationError::TooLarge { max_bytes: 1024 })
        );
    }

    #[test]
    fn first_offending_file_decides() {
        let policy = UploadPolicy {
            max_file_size_bytes: 1024,
            max_files: 10,
        };
        let assets = vec![
            asset("ok.jpg", "image/jpeg", 10),
            asset("bad.zip", "application/zip", 10),
            asset("big.png", "image/png", 4096),
        ];
        assert!(matches!(
            policy.validate(&assets),
            Err(ValidationError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn rejects_too_many_files() {
        let policy = UploadPolicy {
            max_file_size_bytes: 1024,
            max_files: 2,
        };
        let assets: Vec<_> = (0..3).map(|i| asset(&format!("{i}.png"), "image/png", 1)).collect();
        assert_eq!(
            policy.validate(&assets),
            Err(ValidationError::TooManyFiles { max_files: 2 })
        );
    }

    #[test]
    fn too_large_message_reports_megabytes() {
        let policy = UploadPolicy::from_megabytes(10, 10).unwrap();
        let err = policy.check_size(11 * MEBIBYTE).unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size is 10MB.");
    }

    #[test]
    fn body_limit_covers_every_file() {
        let policy = UploadPolicy::from_megabytes(10, 10).unwrap();
        assert_eq!(policy.body_limit_bytes(), 101 * MEBIBYTE);
    }
}
