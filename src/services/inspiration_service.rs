//! InspirationService: submission, listing and aggregate reads.
//!
//! Owns the tier chain, the media sink, the usage estimator and the
//! optional text generator. Handlers call into it and map
//! [`ServiceError`] onto HTTP statuses.

use crate::{
    clients::ai::{AiError, TextGenerator},
    models::{
        leaderboard::{LeaderboardEntry, UserProfile},
        upload::{MediaKind, UploadRecord, UploadStatus},
        usage::{FeatureFlagSet, UsageSnapshot},
    },
    services::{
        flags::resolve_flags,
        karma::calculate_karma,
        limits::{
            MAX_DESCRIPTION_LEN, MAX_TITLE_LEN, UploadLimit, ValidationError, check_upload_limit,
            normalize_email, optional_text, required_text, validate_file, validate_link,
        },
        media::{MediaError, MediaFile, MediaStore},
        tiers::{TierChain, TierError, TierRead},
        usage::UsageEstimator,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const MAX_NAME_LEN: usize = 80;
const MAX_CATEGORY_LEN: usize = 80;
const MAX_ROLE_LEN: usize = 80;
const MAX_PROMPT_LEN: usize = 2000;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("daily upload limit reached")]
    LimitExceeded(UploadLimit),
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("{0}")]
    FeatureDisabled(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Tier(TierError),
    #[error(transparent)]
    Media(MediaError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

impl From<TierError> for ServiceError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::NoWritableTier => ServiceError::NotConfigured("upload storage"),
            other => ServiceError::Tier(other),
        }
    }
}

impl From<MediaError> for ServiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotConfigured => ServiceError::NotConfigured("media storage"),
            MediaError::NotFound(key) => ServiceError::NotFound(format!("media `{}`", key)),
            other => ServiceError::Media(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A file part pulled out of a multipart submission.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Raw submission fields, before validation.
#[derive(Clone, Debug, Default)]
pub struct NewInspiration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub role: Option<String>,
    pub link: Option<String>,
    pub file: Option<UploadedFile>,
}

/// What was stored, and how much karma it earned.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub record: UploadRecord,
    pub karma: i64,
    pub is_first_upload: bool,
    pub remaining_today: usize,
}

/// One page of the newest-first feed.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InspirationPage {
    pub items: Vec<UploadRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub source: &'static str,
}

/// Validated media for a new record.
enum Media {
    File(MediaFile),
    Link(String),
}

/// Settings that shape submissions.
#[derive(Clone, Debug)]
pub struct SubmissionRules {
    pub daily_limit: usize,
    /// When set, only this email domain may submit.
    pub email_domain: Option<String>,
}

#[derive(Clone)]
pub struct InspirationService {
    pub tiers: TierChain,
    pub media: MediaStore,
    pub usage: UsageEstimator,
    pub ai: Option<Arc<dyn TextGenerator>>,
    pub rules: SubmissionRules,
}

impl InspirationService {
    pub fn new(
        tiers: TierChain,
        media: MediaStore,
        usage: UsageEstimator,
        ai: Option<Arc<dyn TextGenerator>>,
        rules: SubmissionRules,
    ) -> Self {
        Self {
            tiers,
            media,
            usage,
            ai,
            rules,
        }
    }

    /// Current gates, from the cached usage snapshot.
    pub async fn flags(&self) -> FeatureFlagSet {
        resolve_flags(&self.usage.cached_snapshot().await)
    }

    /// Cached snapshot plus the gates it implies.
    pub async fn usage_report(&self) -> (UsageSnapshot, FeatureFlagSet) {
        let snapshot = self.usage.cached_snapshot().await;
        let flags = resolve_flags(&snapshot);
        (snapshot, flags)
    }

    /// Recompute usage and overwrite the cache.
    pub async fn refresh_usage(&self) -> (UsageSnapshot, FeatureFlagSet) {
        let snapshot = self.usage.refresh().await;
        let flags = resolve_flags(&snapshot);
        (snapshot, flags)
    }

    /// Validate, rate-limit, score, store media and persist a new record.
    pub async fn submit(&self, input: NewInspiration, now: DateTime<Utc>) -> ServiceResult<Submission> {
        let flags = self.flags().await;
        if !flags.uploads.enabled {
            return Err(ServiceError::FeatureDisabled(
                flags.uploads.message.unwrap_or_else(|| "uploads are disabled".to_string()),
            ));
        }

        let email = normalize_email(
            input.email.as_deref().unwrap_or_default(),
            self.rules.email_domain.as_deref(),
        )?;
        let name = required_text(input.name.as_deref(), "name", MAX_NAME_LEN)?;
        let category = required_text(input.category.as_deref(), "category", MAX_CATEGORY_LEN)?;
        let title = required_text(input.title.as_deref(), "title", MAX_TITLE_LEN)?;
        let description = optional_text(input.description.as_deref(), "description", MAX_DESCRIPTION_LEN)?;
        let role = optional_text(input.role.as_deref(), "role", MAX_ROLE_LEN)?;
        let media = validate_media(input.file, input.link)?;

        let writer = self.tiers.writer()?;
        let existing = writer.records_for(&email).await?;
        let limit = check_upload_limit(&existing, &email, now, self.rules.daily_limit);
        if !limit.allowed {
            info!("upload limit reached for {} ({} today)", email, limit.count);
            return Err(ServiceError::LimitExceeded(limit));
        }

        let is_first_upload = existing.is_empty();
        let kind = match &media {
            Media::File(file) => file.kind,
            Media::Link(_) => MediaKind::Link,
        };
        let karma = calculate_karma(kind, description.is_some(), is_first_upload);

        let id = Uuid::new_v4();
        let mut record = UploadRecord {
            id,
            kind,
            media_url: String::new(),
            thumbnail_url: None,
            uploader_name: name,
            uploader_email: email,
            product: category,
            title,
            description,
            created_at: now,
            karma_points: karma,
            status: UploadStatus::Pending,
        };

        match media {
            Media::Link(link) => record.media_url = link,
            Media::File(file) => {
                let stored = self.media.store(id, &file, asset_context(&record)).await?;
                record.media_url = stored.url;
                record.thumbnail_url = stored.thumbnail_url;
            }
        }

        if let Err(err) = writer.insert(&record, role.as_deref()).await {
            if let Err(media_err) = self.media.remove(&record).await {
                warn!("could not remove media for unsaved upload {}: {}", id, media_err);
            }
            return Err(err.into());
        }
        info!(
            "stored inspiration {} from {} in {} tier ({} karma)",
            record.id,
            record.uploader_email,
            writer.name(),
            karma
        );

        Ok(Submission {
            record,
            karma,
            is_first_upload,
            remaining_today: limit.remaining.saturating_sub(1),
        })
    }

    /// Newest-first page. `limit` is clamped to 1..=100.
    pub async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> InspirationPage {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let TierRead { tier, value } = self.tiers.list().await;
        let total = value.len();
        let items = value.into_iter().skip(offset).take(limit).collect();
        InspirationPage {
            items,
            total,
            limit,
            offset,
            source: tier,
        }
    }

    pub async fn leaderboard(&self, limit: Option<usize>) -> TierRead<Vec<LeaderboardEntry>> {
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut read = self.tiers.leaderboard().await;
        read.value.truncate(limit);
        read
    }

    /// Daily limit status for `email`, read from the write tier.
    pub async fn upload_limit(&self, email: &str, now: DateTime<Utc>) -> ServiceResult<UploadLimit> {
        let email = normalize_email(email, None)?;
        let records = match self.tiers.writer() {
            Ok(writer) => writer.records_for(&email).await?,
            Err(_) => Vec::new(),
        };
        Ok(check_upload_limit(&records, &email, now, self.rules.daily_limit))
    }

    pub async fn profile(&self, email: &str) -> ServiceResult<TierRead<UserProfile>> {
        let email = normalize_email(email, None)?;
        let TierRead { tier, value } = self.tiers.profile(&email).await;
        value
            .map(|value| TierRead { tier, value })
            .ok_or_else(|| ServiceError::NotFound(format!("user `{}`", email)))
    }

    /// Delete a record from the write tier, then its media file.
    pub async fn delete(&self, id: Uuid) -> ServiceResult<UploadRecord> {
        let writer = self.tiers.writer()?;
        let record = writer
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inspiration `{}`", id)))?;
        info!("deleted inspiration {} from {} tier", id, writer.name());

        if let Err(err) = self.media.remove(&record).await {
            warn!("record {} deleted but its media was not: {}", id, err);
        }
        Ok(record)
    }

    /// Suggest a description for `prompt`, counting the call against the AI quota.
    pub async fn generate(&self, prompt: &str) -> ServiceResult<String> {
        let ai = self
            .ai
            .as_ref()
            .ok_or(ServiceError::NotConfigured("AI generation"))?;
        let prompt = required_text(Some(prompt), "prompt", MAX_PROMPT_LEN)?;

        let flags = self.flags().await;
        if !flags.ai_generation.enabled {
            return Err(ServiceError::FeatureDisabled(
                flags
                    .ai_generation
                    .message
                    .unwrap_or_else(|| "AI generation is disabled".to_string()),
            ));
        }

        let text = ai.generate(&prompt).await?;
        if let Err(err) = self.usage.record_ai_request().await {
            warn!("could not count AI request: {:#}", err);
        }
        Ok(text)
    }
}

fn validate_media(file: Option<UploadedFile>, link: Option<String>) -> Result<Media, ValidationError> {
    let link = link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    let file = file.filter(|f| !f.data.is_empty());
    match (file, link) {
        (Some(_), Some(_)) => Err(ValidationError::FileAndLink),
        (None, None) => Err(ValidationError::NoMedia),
        (None, Some(link)) => Ok(Media::Link(validate_link(&link)?)),
        (Some(file), None) => {
            let kind = validate_file(&file.content_type, file.data.len())?;
            Ok(Media::File(MediaFile {
                file_name: file.file_name,
                content_type: file.content_type.trim().to_ascii_lowercase(),
                kind,
                data: file.data,
            }))
        }
    }
}

/// Record fields carried on an object-storage asset.
fn asset_context(record: &UploadRecord) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    context.insert("id".to_string(), record.id.to_string());
    context.insert("email".to_string(), record.uploader_email.clone());
    context.insert("name".to_string(), record.uploader_name.clone());
    context.insert("product".to_string(), record.product.clone());
    context.insert("title".to_string(), record.title.clone());
    context.insert("kind".to_string(), record.kind.as_str().to_string());
    context.insert("karma".to_string(), record.karma_points.to_string());
    context.insert("status".to_string(), record.status.as_str().to_string());
    if let Some(description) = &record.description {
        context.insert("description".to_string(), description.clone());
    }
    context
}
