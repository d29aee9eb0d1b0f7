//! Hosted key-value store client.
//!
//! Speaks the Upstash Redis REST protocol: every command is a JSON array
//! POSTed to the base URL with a bearer token, answered by
//! `{"result": ...}` or `{"error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("key-value store error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("key-value command `{command}` failed: {message}")]
    Command { command: String, message: String },
    #[error("unexpected key-value reply to `{command}`: {reply}")]
    UnexpectedReply { command: String, reply: String },
}

pub type KvResult<T> = Result<T, KvError>;

/// The subset of Redis commands the service relies on.
///
/// Implementations must be thread-safe; the store's own atomicity for
/// single commands is the only consistency guarantee.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// `SET key value EX ttl_secs`
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()>;

    async fn incr(&self, key: &str) -> KvResult<i64>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()>;

    async fn lpush(&self, key: &str, value: &str) -> KvResult<()>;

    /// Inclusive range; negative indexes count from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>>;

    /// Remove up to `count` occurrences of `value`; returns how many went.
    async fn lrem(&self, key: &str, count: i64, value: &str) -> KvResult<i64>;

    async fn zincrby(&self, key: &str, increment: i64, member: &str) -> KvResult<f64>;

    /// Members with scores, highest score first.
    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvResult<Vec<(String, f64)>>;

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()>;

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>>;

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> KvResult<i64>;

    /// Raw `INFO` text.
    async fn info(&self) -> KvResult<String>;
}

/// REST client for an Upstash Redis database.
pub struct UpstashClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Send one command and return its `result` value.
    async fn command(&self, args: &[String]) -> KvResult<Value> {
        let name = args.first().cloned().unwrap_or_default();
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(KvError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: CommandReply = response.json().await?;
        if let Some(message) = reply.error {
            return Err(KvError::Command {
                command: name,
                message,
            });
        }
        Ok(reply.result)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn unexpected(command: &str, reply: &Value) -> KvError {
    KvError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}

fn as_i64(command: &str, value: &Value) -> KvResult<i64> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| unexpected(command, value)),
        Value::String(s) => s.parse().map_err(|_| unexpected(command, value)),
        _ => Err(unexpected(command, value)),
    }
}

fn as_f64(command: &str, value: &Value) -> KvResult<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| unexpected(command, value)),
        Value::String(s) => s.parse().map_err(|_| unexpected(command, value)),
        _ => Err(unexpected(command, value)),
    }
}

fn as_strings(command: &str, value: &Value) -> KvResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(unexpected(command, other)),
            })
            .collect(),
        other => Err(unexpected(command, other)),
    }
}

#[async_trait]
impl KvStore for UpstashClient {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        match self.command(&args(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(unexpected("GET", &other)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        let ttl = ttl_secs.to_string();
        self.command(&args(["SET", key, value, "EX", ttl.as_str()])).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let reply = self.command(&args(["INCR", key])).await?;
        as_i64("INCR", &reply)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()> {
        let ttl = ttl_secs.to_string();
        self.command(&args(["EXPIRE", key, ttl.as_str()])).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> KvResult<()> {
        self.command(&args(["LPUSH", key, value])).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        let reply = self.command(&args(["LRANGE", key, start.as_str(), stop.as_str()])).await?;
        as_strings("LRANGE", &reply)
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> KvResult<i64> {
        let count = count.to_string();
        let reply = self.command(&args(["LREM", key, count.as_str(), value])).await?;
        as_i64("LREM", &reply)
    }

    async fn zincrby(&self, key: &str, increment: i64, member: &str) -> KvResult<f64> {
        let increment = increment.to_string();
        let reply = self
            .command(&args(["ZINCRBY", key, increment.as_str(), member]))
            .await?;
        as_f64("ZINCRBY", &reply)
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KvResult<Vec<(String, f64)>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        let reply = self
            .command(&args(["ZREVRANGE", key, start.as_str(), stop.as_str(), "WITHSCORES"]))
            .await?;
        let flat = as_strings("ZREVRANGE", &reply)?;
        flat.chunks(2)
            .map(|pair| match pair {
                [member, score] => score
                    .parse::<f64>()
                    .map(|s| (member.clone(), s))
                    .map_err(|_| unexpected("ZREVRANGE", &reply)),
                _ => Err(unexpected("ZREVRANGE", &reply)),
            })
            .collect()
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()> {
        let mut cmd = args(["HSET", key]);
        for (field, value) in fields {
            cmd.push(field.to_string());
            cmd.push(value.clone());
        }
        self.command(&cmd).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        let reply = self.command(&args(["HGETALL", key])).await?;
        let flat = as_strings("HGETALL", &reply)?;
        Ok(flat
            .chunks(2)
            .filter_map(|pair| match pair {
                [field, value] => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect())
    }

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> KvResult<i64> {
        let increment = increment.to_string();
        let reply = self
            .command(&args(["HINCRBY", key, field, increment.as_str()]))
            .await?;
        as_i64("HINCRBY", &reply)
    }

    async fn info(&self) -> KvResult<String> {
        match self.command(&args(["INFO"])).await? {
            Value::String(s) => Ok(s),
            other => Err(unexpected("INFO", &other)),
        }
    }
}

/// Pull a numeric field out of `INFO` output (`name:value` lines).
pub fn info_field(info: &str, name: &str) -> Option<f64> {
    info.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        (key == name).then(|| value.trim().parse().ok()).flatten()
    })
}
