//! Represents a single user-submitted inspiration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Kind of media attached to an upload.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
    Link,
}

impl MediaKind {
    /// Classify an uploaded file by its MIME type.
    ///
    /// Returns `None` for anything that is not an image or a video.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime == "image/gif" {
            Some(Self::Gif)
        } else if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "gif" => Ok(Self::Gif),
            "link" => Ok(Self::Link),
            other => Err(format!("unknown media kind `{}`", other)),
        }
    }
}

/// Moderation status of an upload.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown upload status `{}`", other)),
        }
    }
}

/// One inspiration as stored by whichever tier is active.
///
/// Records are immutable once created; the only mutation is deletion.
/// `karma_points` is fixed at creation time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,

    pub kind: MediaKind,

    /// Public URL of the media, or the submitted link.
    pub media_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    pub uploader_name: String,

    /// Always stored lower-cased.
    pub uploader_email: String,

    /// Product or category the inspiration belongs to.
    pub product: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    pub karma_points: i64,

    #[serde(default)]
    pub status: UploadStatus,
}

/// Sort records newest first, breaking ties by id so the order is stable.
pub fn sort_newest_first(records: &mut [UploadRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mime_types() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("IMAGE/GIF"), Some(MediaKind::Gif));
        assert_eq!(MediaKind::from_mime("video/mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let record = UploadRecord {
            id: Uuid::nil(),
            kind: MediaKind::Gif,
            media_url: "https://cdn.test/a.gif".into(),
            thumbnail_url: None,
            uploader_name: "Ada".into(),
            uploader_email: "ada@example.com".into(),
            product: "Buttons".into(),
            title: "Hover states".into(),
            description: None,
            created_at: Utc::now(),
            karma_points: 20,
            status: UploadStatus::Approved,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "gif");
        assert_eq!(json["karmaPoints"], 20);
        assert_eq!(json["status"], "approved");
        assert!(json.get("thumbnailUrl").is_none());
    }
}
