use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub owner_id: Uuid,
    pub name: String,
    pub size_bytes: i64,
    pub location: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    Ok,
    EmptyName,
    UnsupportedType,
    SingleFileTooLarge,
    QuotaExceeded,
    IoError,
}

impl UploadReason {
    pub fn message(&self) -> &'static str {
        match self {
            UploadReason::Ok => "File uploaded",
            UploadReason::EmptyName => "No usable filename was provided",
            UploadReason::UnsupportedType => "File type is not allowed",
            UploadReason::SingleFileTooLarge => "File exceeds the maximum upload size",
            UploadReason::QuotaExceeded => "Storage limit exceeded",
            UploadReason::IoError => "File could not be stored",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub accepted: bool,
    pub reason: UploadReason,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<StoredFile>,
    pub bytes_used_after: u64,
    pub bytes_remaining: u64,
}

impl UploadResult {
    pub fn accepted(file: StoredFile, usage: Usage) -> Self {
        Self {
            accepted: true,
            reason: UploadReason::Ok,
            message: UploadReason::Ok.message(),
            file: Some(file),
            bytes_used_after: usage.used_bytes,
            bytes_remaining: usage.remaining_bytes,
        }
    }

    pub fn rejected(reason: UploadReason, usage: Usage) -> Self {
        Self {
            accepted: false,
            reason,
            message: reason.message(),
            file: None,
            bytes_used_after: usage.used_bytes,
            bytes_remaining: usage.remaining_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub quota_bytes: u64,
    pub used_bytes: u64,
    pub remaining_bytes: u64,
}

impl Usage {
    pub fn new(quota_bytes: u64, used_bytes: u64) -> Self {
        Self {
            quota_bytes,
            used_bytes,
            remaining_bytes: quota_bytes.saturating_sub(used_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { bytes_freed: u64 },
    NotFound,
    Forbidden,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub enumerable: bool,
    pub adopted: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<StoredFile>,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_remaining_never_negative() {
        let usage = Usage::new(100, 150);
        assert_eq!(usage.remaining_bytes, 0);
        assert_eq!(Usage::new(100, 40).remaining_bytes, 60);
    }

    #[test]
    fn test_rejected_result_serialization() {
        let result = UploadResult::rejected(UploadReason::QuotaExceeded, Usage::new(100, 60));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "quota_exceeded");
        assert_eq!(json["bytes_used_after"], 60);
        assert_eq!(json["bytes_remaining"], 40);
        assert!(json.get("file").is_none());
    }

    #[test]
    fn test_delete_outcome_serialization() {
        let json = serde_json::to_value(DeleteOutcome::Deleted { bytes_freed: 12 }).unwrap();
        assert_eq!(json["status"], "deleted");
        assert_eq!(json["bytes_freed"], 12);
    }
}
