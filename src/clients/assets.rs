//! Object storage client for uploaded media.
//!
//! Wraps the Cloudinary upload and admin APIs using [`reqwest`]. Uploads
//! carry the record's fields as contextual metadata so that a plain
//! listing of the folder is enough to rebuild upload records.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("object storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("object storage error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("object storage usage report is missing credit figures")]
    MissingUsage,
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Resource family as the object store groups them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// A file to push into object storage.
#[derive(Clone, Debug)]
pub struct AssetUpload {
    pub public_id: String,
    pub resource_type: ResourceType,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
    /// Stored as the asset's custom context.
    pub context: BTreeMap<String, String>,
}

/// What the store reports back after an upload.
#[derive(Clone, Debug, Deserialize)]
pub struct StoredAsset {
    pub public_id: String,
    pub secure_url: String,
}

/// One listed asset with its custom context decoded.
#[derive(Clone, Debug, Deserialize)]
pub struct AssetResource {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub context: Option<AssetContext>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AssetContext {
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

/// Object storage operations used by the service.
#[async_trait]
pub trait AssetStore: Send + Sync + 'static {
    async fn upload(&self, upload: AssetUpload) -> AssetResult<StoredAsset>;

    /// List up to `max_results` assets of one type under the configured folder.
    async fn list(&self, resource_type: ResourceType, max_results: u32)
    -> AssetResult<Vec<AssetResource>>;

    async fn delete(&self, resource_type: ResourceType, public_id: &str) -> AssetResult<()>;

    /// Percentage of the plan's credits consumed.
    async fn usage_percent(&self) -> AssetResult<f64>;

    /// Build a thumbnail URL for a stored asset, if the store can render one.
    fn thumbnail_url(&self, resource_type: ResourceType, public_id: &str) -> Option<String>;

    /// Full public id of an asset uploaded under `id`.
    fn public_id_for(&self, id: &str) -> String;
}

/// Cloudinary REST client.
pub struct CloudinaryClient {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<AssetResource>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    credits: Option<CreditUsage>,
}

#[derive(Debug, Deserialize)]
struct CreditUsage {
    #[serde(default)]
    usage: Option<f64>,
    #[serde(default)]
    limit: Option<f64>,
    #[serde(default)]
    used_percent: Option<f64>,
}

impl CloudinaryClient {
    pub fn new(
        client: reqwest::Client,
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: folder.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", API_BASE, self.cloud_name, path)
    }

    async fn ensure_success(response: reqwest::Response) -> AssetResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
        Err(AssetError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

/// Sign upload parameters: sorted `k=v` pairs joined by `&`, secret appended.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a context map as `key=value|key=value`, escaping `=` and `|`.
pub fn encode_context(context: &BTreeMap<String, String>) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{}={}", escape_context(k), escape_context(v)))
        .collect::<Vec<_>>()
        .join("|")
}

fn escape_context(value: &str) -> String {
    value.replace('=', "\\=").replace('|', "\\|")
}

fn credits_percent(credits: &CreditUsage) -> Option<f64> {
    if let Some(percent) = credits.used_percent {
        return Some(percent);
    }
    match (credits.usage, credits.limit) {
        (Some(usage), Some(limit)) if limit > 0.0 => Some(usage / limit * 100.0),
        _ => None,
    }
}

#[async_trait]
impl AssetStore for CloudinaryClient {
    async fn upload(&self, upload: AssetUpload) -> AssetResult<StoredAsset> {
        let timestamp = Utc::now().timestamp().to_string();
        let context = encode_context(&upload.context);

        let mut signed = BTreeMap::new();
        signed.insert("context", context.clone());
        signed.insert("folder", self.folder.clone());
        signed.insert("public_id", upload.public_id.clone());
        signed.insert("timestamp", timestamp.clone());
        let signature = sign_params(&signed, &self.api_secret);

        let file = reqwest::multipart::Part::bytes(upload.data.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("public_id", upload.public_id.clone())
            .text("context", context)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let path = format!("{}/upload", upload.resource_type.as_str());
        let response = self.client.post(self.url(&path)).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn list(
        &self,
        resource_type: ResourceType,
        max_results: u32,
    ) -> AssetResult<Vec<AssetResource>> {
        let path = format!("resources/{}/upload", resource_type.as_str());
        let prefix = format!("{}/", self.folder);
        let max = max_results.to_string();
        let response = self
            .client
            .get(self.url(&path))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[
                ("prefix", prefix.as_str()),
                ("context", "true"),
                ("max_results", max.as_str()),
            ])
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let listing: ListResponse = response.json().await?;
        Ok(listing.resources)
    }

    async fn delete(&self, resource_type: ResourceType, public_id: &str) -> AssetResult<()> {
        let path = format!("resources/{}/upload", resource_type.as_str());
        let response = self
            .client
            .delete(self.url(&path))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[("public_ids[]", public_id)])
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn usage_percent(&self) -> AssetResult<f64> {
        let response = self
            .client
            .get(self.url("usage"))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let usage: UsageResponse = response.json().await?;
        usage
            .credits
            .as_ref()
            .and_then(credits_percent)
            .ok_or(AssetError::MissingUsage)
    }

    fn thumbnail_url(&self, resource_type: ResourceType, public_id: &str) -> Option<String> {
        match resource_type {
            ResourceType::Video => Some(format!(
                "https://res.cloudinary.com/{}/video/upload/so_0,w_480,c_limit/{}.jpg",
                self.cloud_name, public_id
            )),
            ResourceType::Image => Some(format!(
                "https://res.cloudinary.com/{}/image/upload/w_480,c_limit/{}",
                self.cloud_name, public_id
            )),
        }
    }

    fn public_id_for(&self, id: &str) -> String {
        format!("{}/{}", self.folder, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_values_are_escaped() {
        let mut ctx = BTreeMap::new();
        ctx.insert("title".to_string(), "a=b|c".to_string());
        ctx.insert("email".to_string(), "x@y.io".to_string());
        assert_eq!(encode_context(&ctx), "email=x@y.io|title=a\\=b\\|c");
    }

    #[test]
    fn signature_is_stable_and_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("timestamp", "100".to_string());
        a.insert("folder", "inspirations".to_string());
        let mut b = BTreeMap::new();
        b.insert("folder", "inspirations".to_string());
        b.insert("timestamp", "100".to_string());

        let sig = sign_params(&a, "secret");
        assert_eq!(sig, sign_params(&b, "secret"));
        assert_eq!(sig.len(), 64);
        assert_ne!(sig, sign_params(&a, "other"));
    }

    #[test]
    fn credits_prefer_reported_percent() {
        let reported = CreditUsage {
            usage: Some(1.0),
            limit: Some(25.0),
            used_percent: Some(7.5),
        };
        assert_eq!(credits_percent(&reported), Some(7.5));

        let computed = CreditUsage {
            usage: Some(5.0),
            limit: Some(25.0),
            used_percent: None,
        };
        assert_eq!(credits_percent(&computed), Some(20.0));

        let empty = CreditUsage {
            usage: None,
            limit: Some(0.0),
            used_percent: None,
        };
        assert_eq!(credits_percent(&empty), None);
    }
}
