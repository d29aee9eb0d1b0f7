//! Submission validation and the per-user daily upload limit.

use crate::models::upload::{MediaKind, UploadRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_DAILY_UPLOAD_LIMIT: usize = 30;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

const ALLOWED_MIME_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "video/mp4",
    "video/webm",
    "video/quicktime",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("`{0}` is not a valid email address")]
    InvalidEmail(String),
    #[error("only @{0} email addresses may submit inspirations")]
    EmailDomain(String),
    #[error("file type `{0}` is not allowed")]
    MimeType(String),
    #[error("file is {size} bytes; the limit for {kind} uploads is {max} bytes")]
    FileTooLarge {
        kind: MediaKind,
        size: usize,
        max: usize,
    },
    #[error("submit either a file or a link, not both")]
    FileAndLink,
    #[error("a file or a link is required")]
    NoMedia,
    #[error("link must be an absolute http(s) URL")]
    InvalidLink,
}

/// Result of the daily limit check for one uploader.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadLimit {
    pub allowed: bool,
    /// Records created by this email on the same UTC date as `now`.
    pub count: usize,
    pub limit: usize,
    pub remaining: usize,
}

/// Count today's uploads for `email` and decide whether another is allowed.
pub fn check_upload_limit(
    records: &[UploadRecord],
    email: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> UploadLimit {
    let today = now.date_naive();
    let count = records
        .iter()
        .filter(|r| r.uploader_email.eq_ignore_ascii_case(email.trim()))
        .filter(|r| r.created_at.date_naive() == today)
        .count();

    UploadLimit {
        allowed: count < limit,
        count,
        limit,
        remaining: limit.saturating_sub(count),
    }
}

/// Normalize an email and enforce the optional domain restriction.
pub fn normalize_email(raw: &str, allowed_domain: Option<&str>) -> Result<String, ValidationError> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Missing("email"));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ValidationError::InvalidEmail(email.clone()))?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::InvalidEmail(email.clone()));
    }

    if let Some(allowed) = allowed_domain {
        let allowed = allowed.trim().trim_start_matches('@');
        if !domain.eq_ignore_ascii_case(allowed) {
            return Err(ValidationError::EmailDomain(allowed.to_ascii_lowercase()));
        }
    }

    Ok(email)
}

/// Check the declared MIME type and the payload size of an uploaded file.
pub fn validate_file(content_type: &str, size: usize) -> Result<MediaKind, ValidationError> {
    let mime = content_type.trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::MimeType(mime));
    }
    let kind = MediaKind::from_mime(&mime).ok_or_else(|| ValidationError::MimeType(mime.clone()))?;

    let max = match kind {
        MediaKind::Video => MAX_VIDEO_BYTES,
        _ => MAX_IMAGE_BYTES,
    };
    if size > max {
        return Err(ValidationError::FileTooLarge { kind, size, max });
    }
    Ok(kind)
}

pub fn validate_link(link: &str) -> Result<String, ValidationError> {
    let parsed = url::Url::parse(link.trim()).map_err(|_| ValidationError::InvalidLink)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ValidationError::InvalidLink);
    }
    Ok(parsed.to_string())
}

/// Trim a required text field and enforce its maximum length.
pub fn required_text(
    value: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

/// Trim an optional text field; blank input reads as absent.
pub fn optional_text(
    value: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_string())),
    }
}
