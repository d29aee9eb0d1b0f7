//! In-memory stand-ins for the external clients, used by tests.

use super::{
    ai::{AiError, TextGenerator},
    assets::{
        AssetContext, AssetError, AssetResource, AssetResult, AssetStore, AssetUpload,
        ResourceType, StoredAsset,
    },
    kv::{KvError, KvResult, KvStore},
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

#[derive(Default)]
struct KvData {
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    hashes: HashMap<String, HashMap<String, String>>,
    ttls: HashMap<String, u64>,
}

/// Redis-like store backed by hash maps. TTLs are recorded, never enforced.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<KvData>,
    pub info_text: Mutex<String>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let kv = Self::default();
        kv.fail.store(true, Ordering::SeqCst);
        kv
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.data.lock().unwrap().ttls.get(key).copied()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    fn guard(&self) -> KvResult<std::sync::MutexGuard<'_, KvData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(KvError::Api {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.data.lock().unwrap())
    }
}

fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let norm = |i: i64| if i < 0 { len + i } else { i };
    let (start, stop) = (norm(start).max(0), norm(stop).min(len - 1));
    (start <= stop && len > 0).then_some((start as usize, stop as usize))
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.guard()?.strings.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        let mut data = self.guard()?;
        data.strings.insert(key.to_string(), value.to_string());
        data.ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut data = self.guard()?;
        let entry = data.strings.entry(key.to_string()).or_insert_with(|| "0".into());
        let next = entry.parse::<i64>().unwrap_or(0) + 1;
        *entry = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()> {
        self.guard()?.ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> KvResult<()> {
        self.guard()?
            .lists
            .entry(key.to_string())
            .or_default()
            .insert(0, value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        let data = self.guard()?;
        let Some(list) = data.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((s, e)) => list[s..=e].to_vec(),
            None => Vec::new(),
        })
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> KvResult<i64> {
        let mut data = self.guard()?;
        let Some(list) = data.lists.get_mut(key) else {
            return Ok(0);
        };
        let mut removed = 0;
        list.retain(|item| {
            if item == value && (count == 0 || removed < count.abs()) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn zincrby(&self, key: &str, increment: i64, member: &str) -> KvResult<f64> {
        let mut data = self.guard()?;
        let score = data
            .zsets
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(0.0);
        *score += increment as f64;
        Ok(*score)
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvResult<Vec<(String, f64)>> {
        let data = self.guard()?;
        let mut members: Vec<(String, f64)> = data
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(match resolve_range(members.len(), start, stop) {
            Some((s, e)) => members[s..=e].to_vec(),
            None => Vec::new(),
        })
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()> {
        let mut data = self.guard()?;
        let hash = data.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        Ok(self.guard()?.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> KvResult<i64> {
        let mut data = self.guard()?;
        let value = data
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".into());
        let next = value.parse::<i64>().unwrap_or(0) + increment;
        *value = next.to_string();
        Ok(next)
    }

    async fn info(&self) -> KvResult<String> {
        drop(self.guard()?);
        Ok(self.info_text.lock().unwrap().clone())
    }
}

/// Object store that keeps uploads in memory and reports a fixed usage.
#[derive(Default)]
pub struct FakeAssets {
    pub resources: Mutex<Vec<(ResourceType, AssetResource)>>,
    pub usage: Mutex<Option<f64>>,
    pub list_calls: AtomicUsize,
}

impl FakeAssets {
    pub fn with_usage(percent: f64) -> Self {
        let fake = Self::default();
        *fake.usage.lock().unwrap() = Some(percent);
        fake
    }

    pub fn add(&self, resource_type: ResourceType, resource: AssetResource) {
        self.resources.lock().unwrap().push((resource_type, resource));
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn upload(&self, upload: AssetUpload) -> AssetResult<StoredAsset> {
        let public_id = format!("inspirations/{}", upload.public_id);
        let secure_url = format!("https://cdn.test/{}", public_id);
        self.add(
            upload.resource_type,
            AssetResource {
                public_id: public_id.clone(),
                secure_url: secure_url.clone(),
                resource_type: Some(upload.resource_type.as_str().to_string()),
                format: None,
                created_at: Utc::now(),
                context: Some(AssetContext {
                    custom: upload.context.into_iter().collect(),
                }),
            },
        );
        Ok(StoredAsset {
            public_id,
            secure_url,
        })
    }

    async fn list(
        &self,
        resource_type: ResourceType,
        max_results: u32,
    ) -> AssetResult<Vec<AssetResource>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == resource_type)
            .take(max_results as usize)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn delete(&self, resource_type: ResourceType, public_id: &str) -> AssetResult<()> {
        self.resources
            .lock()
            .unwrap()
            .retain(|(t, r)| !(*t == resource_type && r.public_id == public_id));
        Ok(())
    }

    async fn usage_percent(&self) -> AssetResult<f64> {
        (*self.usage.lock().unwrap()).ok_or(AssetError::MissingUsage)
    }

    fn thumbnail_url(&self, _resource_type: ResourceType, public_id: &str) -> Option<String> {
        Some(format!("https://cdn.test/thumb/{}", public_id))
    }

    fn public_id_for(&self, id: &str) -> String {
        format!("inspirations/{}", id)
    }
}

/// Generator that echoes the prompt back.
#[derive(Default)]
pub struct EchoGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("suggested: {}", prompt))
    }
}
