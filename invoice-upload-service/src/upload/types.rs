//! Data model for batch uploads.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Document type sent with every create-document request
pub const DOCUMENT_TYPE: &str = "invoice";

/// Lifecycle of a single upload item
///
/// Items advance `pending → uploading → uploaded → creating_document → completed`.
/// `error` is reachable from `uploading` and `creating_document` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
    CreatingDocument,
    Completed,
    Error,
}

impl UploadStatus {
    /// Settled items count towards overall batch progress
    pub fn is_settled(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }

    /// Whether moving from `self` to `next` follows the item lifecycle.
    ///
    /// Resetting an errored item to `pending` for a retry is the only backwards step.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Uploaded)
                | (Uploading, Error)
                | (Uploaded, CreatingDocument)
                | (CreatingDocument, Completed)
                | (CreatingDocument, Error)
                | (Error, Pending)
        )
    }
}

/// Parse mode forwarded to the document service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParseMode(String);

impl ParseMode {
    pub fn new(mode: impl Into<String>) -> Self {
        Self(mode.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ParseMode {
    fn default() -> Self {
        Self("auto".to_string())
    }
}

/// Raw file payload selected by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
    #[serde(skip)]
    pub data: Bytes,
}

impl SourceFile {
    /// Create a source file; unparseable content types are dropped.
    pub fn new(name: impl Into<String>, content_type: Option<&str>, data: Bytes) -> Self {
        let content_type = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|ct| ct.to_string());

        Self {
            name: name.into(),
            content_type,
            size: data.len() as u64,
            data,
        }
    }

    /// File name with its final extension stripped (`a.b.pdf` → `a.b`)
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }
}

/// Reference to a file stored by the document service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFileRef {
    #[serde(alias = "file_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// One file's progress through upload and document creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadItem {
    pub id: String,
    pub file: SourceFile,
    pub display_name: String,
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_file: Option<UploadedFileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub selected_at: DateTime<Utc>,
}

impl UploadItem {
    /// Create a pending item with a fresh id
    pub fn new(file: SourceFile) -> Self {
        let display_name = file.stem().to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file,
            display_name,
            status: UploadStatus::Pending,
            progress: 0,
            uploaded_file: None,
            document_id: None,
            error_message: None,
            selected_at: Utc::now(),
        }
    }

    /// Name used for the created document; blank display names fall back to the file stem
    pub fn document_name(&self) -> String {
        let trimmed = self.display_name.trim();
        if trimmed.is_empty() {
            self.file.stem().to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Return the item to its just-selected state
    pub(crate) fn reset(&mut self) {
        self.status = UploadStatus::Pending;
        self.progress = 0;
        self.uploaded_file = None;
        self.document_id = None;
        self.error_message = None;
    }
}

/// Partial change merged into a registry item
///
/// `None` leaves a field untouched. Optional item fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub status: Option<UploadStatus>,
    pub progress: Option<u8>,
    pub display_name: Option<String>,
    pub uploaded_file: Option<Option<UploadedFileRef>>,
    pub document_id: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
}

impl ItemUpdate {
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_uploaded_file(mut self, file: UploadedFileRef) -> Self {
        self.uploaded_file = Some(Some(file));
        self
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(Some(document_id.into()));
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clearing_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, item: &mut UploadItem) {
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(progress) = self.progress {
            item.progress = progress;
        }
        if let Some(name) = &self.display_name {
            item.display_name = name.clone();
        }
        if let Some(file) = &self.uploaded_file {
            item.uploaded_file = file.clone();
        }
        if let Some(document_id) = &self.document_id {
            item.document_id = document_id.clone();
        }
        if let Some(message) = &self.error_message {
            item.error_message = message.clone();
        }
    }
}

/// Outcome of one item's pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn succeeded(id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: Some(document_id.into()),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Shared settings of one batch, kept per item so retries reuse them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchOptions {
    pub collection_id: String,
    #[serde(default)]
    pub parse_mode: ParseMode,
}

impl BatchOptions {
    pub fn new(collection_id: impl Into<String>, parse_mode: ParseMode) -> Self {
        Self {
            collection_id: collection_id.into(),
            parse_mode,
        }
    }
}

/// Read-only view of the active batch
#[derive(Debug, Clone, Serialize)]
pub struct UploadSnapshot {
    pub items: Vec<UploadItem>,
    pub overall_progress_percent: u8,
    pub is_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SourceFile {
        SourceFile::new(name, Some("application/pdf"), Bytes::from_static(b"%PDF-1.7"))
    }

    #[test]
    fn test_display_name_strips_extension() {
        assert_eq!(UploadItem::new(file("invoice-0042.pdf")).display_name, "invoice-0042");
        assert_eq!(UploadItem::new(file("scan.2024.03.png")).display_name, "scan.2024.03");
        assert_eq!(UploadItem::new(file("README")).display_name, "README");
        assert_eq!(UploadItem::new(file(".hidden")).display_name, ".hidden");
    }

    #[test]
    fn test_document_name_falls_back_to_stem() {
        let mut item = UploadItem::new(file("acme-march.pdf"));
        item.display_name = "   ".to_string();
        assert_eq!(item.document_name(), "acme-march");

        item.display_name = "  ACME March  ".to_string();
        assert_eq!(item.document_name(), "ACME March");
    }

    #[test]
    fn test_item_ids_are_unique() {
        let a = UploadItem::new(file("a.pdf"));
        let b = UploadItem::new(file("a.pdf"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_invalid_content_type_is_dropped() {
        let f = SourceFile::new("a.pdf", Some("not a mime"), Bytes::new());
        assert!(f.content_type.is_none());
        assert_eq!(f.size, 0);
    }

    #[test]
    fn test_status_transitions() {
        use UploadStatus::*;
        assert!(Pending.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Error));
        assert!(CreatingDocument.can_transition_to(Error));
        assert!(Error.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Error));
        assert!(!Uploaded.can_transition_to(Error));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(UploadStatus::CreatingDocument.to_string(), "creating_document");
        assert_eq!(
            "creating_document".parse::<UploadStatus>().unwrap(),
            UploadStatus::CreatingDocument
        );
        assert_eq!(
            serde_json::to_value(UploadStatus::Completed).unwrap(),
            serde_json::json!("completed")
        );
    }

    #[test]
    fn test_update_clears_optional_fields() {
        let mut item = UploadItem::new(file("a.pdf"));
        ItemUpdate::status(UploadStatus::Uploading)
            .with_error("boom")
            .apply(&mut item);
        assert_eq!(item.error_message.as_deref(), Some("boom"));

        ItemUpdate::status(UploadStatus::Uploading)
            .clearing_error()
            .apply(&mut item);
        assert!(item.error_message.is_none());
        assert_eq!(item.status, UploadStatus::Uploading);
    }

    #[test]
    fn test_snapshot_omits_file_bytes() {
        let item = UploadItem::new(file("a.pdf"));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["file"]["name"], "a.pdf");
        assert_eq!(json["file"]["size"], 8);
        assert!(json["file"].get("data").is_none());
        assert_eq!(json["status"], "pending");
    }
}
