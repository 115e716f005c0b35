use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file or an inline blob attached to a result or step.
///
/// Exactly one of `path` and `content` must be set for the attachment to be
/// uploadable. The constructors guarantee that; deserialized or hand-built
/// values are checked with [`Attachment::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attachment {
    pub title: Option<String>,
    pub mime: Option<String>,
    #[serde(default, with = "base64_content", skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Why an attachment cannot be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment has neither path nor content")]
    Empty,

    #[error("attachment has both path and content")]
    Ambiguous,
}

impl Attachment {
    /// References a file on disk; the title defaults to the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            title,
            mime: None,
            content: None,
            path: Some(path),
        }
    }

    /// Carries the bytes inline.
    pub fn from_content(
        title: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mime: Option<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            mime,
            content: Some(content.into()),
            path: None,
        }
    }

    pub fn validate(&self) -> Result<(), AttachmentError> {
        match (&self.path, &self.content) {
            (Some(_), Some(_)) => Err(AttachmentError::Ambiguous),
            (None, None) => Err(AttachmentError::Empty),
            _ => Ok(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Name used in logs and as the uploaded file name.
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "attachment".to_string(),
        }
    }
}

mod base64_content {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
