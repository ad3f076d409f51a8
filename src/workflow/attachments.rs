// Attachment declarations and pre-authorized upload handles

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::error::{SideEffectError, WorkflowError};
use crate::showset::{AttachmentRef, ShowSetId};

pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
];

/// A caller's declaration of a file it intends to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl AttachmentDescriptor {
    pub fn validate(&self, max_size_bytes: u64) -> Result<(), WorkflowError> {
        if !ALLOWED_MIME_TYPES.contains(&self.mime_type.as_str()) {
            return Err(WorkflowError::validation(format!(
                "attachment type '{}' is not allowed",
                self.mime_type
            )));
        }
        if self.size_bytes == 0 || self.size_bytes > max_size_bytes {
            return Err(WorkflowError::validation(format!(
                "attachment size {} is outside 1..={} bytes",
                self.size_bytes, max_size_bytes
            )));
        }
        if self.file_name.trim().is_empty() {
            return Err(WorkflowError::validation("attachment file name is empty"));
        }
        Ok(())
    }

    /// Binds the declaration to a fresh attachment id under a note.
    pub fn bind(&self, show_set_id: &ShowSetId, note_id: Uuid) -> AttachmentRef {
        let id = Uuid::new_v4();
        AttachmentRef {
            id,
            key: attachment_key(show_set_id, note_id, id, &self.mime_type),
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Deterministic storage key for an attachment.
pub fn attachment_key(
    show_set_id: &ShowSetId,
    note_id: Uuid,
    attachment_id: Uuid,
    mime_type: &str,
) -> String {
    format!(
        "revision-notes/{}/{}/{}.{}",
        show_set_id,
        note_id,
        attachment_id,
        extension_for(mime_type)
    )
}

/// Time-limited, write-capable handle for a single object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadHandle {
    pub url: String,
    pub key: String,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn request_upload(
        &self,
        bucket: &str,
        key: &str,
        mime_type: &str,
        size_bytes: u64,
    ) -> Result<UploadHandle, SideEffectError>;
}

/// Issues upload URLs against a local or proxy endpoint with a one-time token.
#[derive(Debug, Clone)]
pub struct LocalUploadSigner {
    base_url: String,
    expiry: Duration,
}

impl LocalUploadSigner {
    pub fn new(base_url: impl Into<String>, expiry_seconds: i64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            expiry: Duration::seconds(expiry_seconds),
        }
    }
}

#[async_trait]
impl UploadSigner for LocalUploadSigner {
    async fn request_upload(
        &self,
        bucket: &str,
        key: &str,
        mime_type: &str,
        size_bytes: u64,
    ) -> Result<UploadHandle, SideEffectError> {
        if bucket.is_empty() {
            return Err(SideEffectError::Rejected("no upload bucket configured".to_string()));
        }
        let expires_at = Utc::now() + self.expiry;
        let url = format!(
            "{}/{}/{}?token={}&expires={}&content-length={}",
            self.base_url,
            bucket,
            key,
            Uuid::new_v4().simple(),
            expires_at.timestamp(),
            size_bytes
        );
        Ok(UploadHandle {
            url,
            key: key.to_string(),
            mime_type: mime_type.to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(size_bytes: u64) -> AttachmentDescriptor {
        AttachmentDescriptor {
            file_name: "markup.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes,
        }
    }

    #[test]
    fn test_allowed_types_pass() {
        for mime in ALLOWED_MIME_TYPES {
            let descriptor = AttachmentDescriptor {
                mime_type: mime.to_string(),
                ..pdf(1024)
            };
            assert!(descriptor.validate(10_000).is_ok(), "{mime} should pass");
        }
    }

    #[test]
    fn test_disallowed_type_and_size() {
        let svg = AttachmentDescriptor {
            mime_type: "image/svg+xml".to_string(),
            ..pdf(1024)
        };
        assert!(matches!(svg.validate(10_000), Err(WorkflowError::Validation(_))));
        assert!(matches!(pdf(0).validate(10_000), Err(WorkflowError::Validation(_))));
        assert!(matches!(
            pdf(10_001).validate(10_000),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_key_is_derived_from_ids() {
        let note_id = Uuid::new_v4();
        let attachment_id = Uuid::new_v4();
        let key = attachment_key(
            &ShowSetId::new("AB-101"),
            note_id,
            attachment_id,
            "image/jpeg",
        );
        assert_eq!(
            key,
            format!("revision-notes/AB-101/{note_id}/{attachment_id}.jpg")
        );
    }

    #[tokio::test]
    async fn test_local_signer_issues_scoped_handle() {
        let signer = LocalUploadSigner::new("http://localhost:9000/", 900);
        let handle = signer
            .request_upload("showsets", "revision-notes/a/b/c.pdf", "application/pdf", 42)
            .await
            .unwrap();
        assert!(handle
            .url
            .starts_with("http://localhost:9000/showsets/revision-notes/a/b/c.pdf?token="));
        assert!(handle.expires_at > Utc::now());
        assert_eq!(handle.key, "revision-notes/a/b/c.pdf");
    }
}
