use crate::{
    clients::ai::DEFAULT_MODEL,
    services::{limits::DEFAULT_DAILY_UPLOAD_LIMIT, usage::UsageLimits},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt::Display, str::FromStr};

const DEFAULT_ASSET_FOLDER: &str = "inspirations";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// SQLite URL for the local tier. Without it the local tier is in-memory.
    pub database_url: Option<String>,
    /// Directory for locally stored media.
    pub media_dir: Option<String>,
    pub kv: Option<KvConfig>,
    pub assets: Option<AssetConfig>,
    pub ai: Option<AiConfig>,
    pub cron_secret: Option<String>,
    pub admin: AdminConfig,
    /// Restrict submissions to one email domain.
    pub email_domain: Option<String>,
    pub daily_upload_limit: usize,
    pub usage_limits: UsageLimits,
}

#[derive(Clone)]
pub struct KvConfig {
    pub url: String,
    pub token: String,
}

#[derive(Clone)]
pub struct AssetConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
}

/// Who may call the admin endpoints.
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Lower-cased allow-list.
    pub emails: Vec<String>,
    pub domain: Option<String>,
}

impl AdminConfig {
    /// Allow-listed, or on the admin domain. Case-insensitive.
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return false;
        }
        if self.emails.iter().any(|e| *e == email) {
            return true;
        }
        match (&self.domain, email.rsplit_once('@')) {
            (Some(domain), Some((local, host))) => !local.is_empty() && host == domain,
            _ => false,
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for KvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvConfig").field("url", &self.url).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for AssetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetConfig")
            .field("cloud_name", &self.cloud_name)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("media_dir", &self.media_dir)
            .field("kv", &self.kv)
            .field("assets", &self.assets)
            .field("ai", &self.ai)
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .field("admin", &self.admin)
            .field("email_domain", &self.email_domain)
            .field("daily_upload_limit", &self.daily_upload_limit)
            .field("usage_limits", &self.usage_limits)
            .finish()
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig").field("model", &self.model).finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Inspirations API: uploads, karma and leaderboard")]
pub struct Args {
    /// Host to bind to (overrides INSPIRATIONS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides INSPIRATIONS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite database URL for the local tier (overrides INSPIRATIONS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for locally stored media (overrides INSPIRATIONS_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge `args` over the variables returned by `lookup`.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Blank values count as unset.
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let kv = match (var("UPSTASH_REDIS_REST_URL"), var("UPSTASH_REDIS_REST_TOKEN")) {
            (Some(url), Some(token)) => Some(KvConfig { url, token }),
            _ => None,
        };

        let assets = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(AssetConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: var("CLOUDINARY_FOLDER").unwrap_or_else(|| DEFAULT_ASSET_FOLDER.into()),
            }),
            _ => None,
        };

        let ai = var("GEMINI_API_KEY").map(|api_key| AiConfig {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
        });

        let admin = AdminConfig {
            emails: var("INSPIRATIONS_ADMIN_EMAILS")
                .map(|list| {
                    list.split(',')
                        .map(|e| e.trim().to_ascii_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            domain: var("INSPIRATIONS_ADMIN_DOMAIN").map(|d| clean_domain(&d)),
        };

        let defaults = UsageLimits::default();
        let usage_limits = UsageLimits {
            kv_storage_bytes: parse_var::<f64>(&var, "INSPIRATIONS_KV_STORAGE_LIMIT_MB")?
                .map(|mb| mb * 1024.0 * 1024.0)
                .unwrap_or(defaults.kv_storage_bytes),
            kv_commands: parse_var(&var, "INSPIRATIONS_KV_COMMAND_LIMIT")?
                .unwrap_or(defaults.kv_commands),
            ai_daily_requests: parse_var(&var, "INSPIRATIONS_AI_DAILY_LIMIT")?
                .unwrap_or(defaults.ai_daily_requests),
        };

        let env_port = parse_var(&var, "INSPIRATIONS_PORT")?.unwrap_or(3000);

        Ok(Self {
            host: args
                .host
                .or_else(|| var("INSPIRATIONS_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.or_else(|| var("INSPIRATIONS_DATABASE_URL")),
            media_dir: args.media_dir.or_else(|| var("INSPIRATIONS_MEDIA_DIR")),
            kv,
            assets,
            ai,
            cron_secret: var("CRON_SECRET"),
            admin,
            email_domain: var("INSPIRATIONS_EMAIL_DOMAIN").map(|d| clean_domain(&d)),
            daily_upload_limit: parse_var(&var, "INSPIRATIONS_DAILY_UPLOAD_LIMIT")?
                .unwrap_or(DEFAULT_DAILY_UPLOAD_LIMIT),
            usage_limits,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(None),
    }
}

fn clean_domain(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], args: Args) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_sources(args, |name| map.get(name).cloned())
    }

    #[test]
    fn defaults_leave_every_service_unconfigured() {
        let cfg = load(&[], Args::default()).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert!(cfg.kv.is_none());
        assert!(cfg.assets.is_none());
        assert!(cfg.ai.is_none());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.daily_upload_limit, 30);
        assert_eq!(cfg.usage_limits, UsageLimits::default());
    }

    #[test]
    fn a_service_needs_every_variable() {
        let cfg = load(
            &[
                ("UPSTASH_REDIS_REST_URL", "https://kv.test"),
                ("UPSTASH_REDIS_REST_TOKEN", "  "),
                ("CLOUDINARY_CLOUD_NAME", "demo"),
                ("CLOUDINARY_API_KEY", "key"),
                ("CLOUDINARY_API_SECRET", "secret"),
            ],
            Args::default(),
        )
        .unwrap();
        assert!(cfg.kv.is_none());
        let assets = cfg.assets.unwrap();
        assert_eq!(assets.folder, "inspirations");
    }

    #[test]
    fn args_override_environment() {
        let args = Args {
            port: Some(8080),
            database_url: Some("sqlite://cli.db".into()),
            ..Args::default()
        };
        let cfg = load(
            &[
                ("INSPIRATIONS_PORT", "9000"),
                ("INSPIRATIONS_HOST", "127.0.0.1"),
                ("INSPIRATIONS_DATABASE_URL", "sqlite://env.db"),
                ("INSPIRATIONS_KV_STORAGE_LIMIT_MB", "1"),
            ],
            args,
        )
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite://cli.db"));
        assert_eq!(cfg.usage_limits.kv_storage_bytes, 1024.0 * 1024.0);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = load(&[("INSPIRATIONS_DAILY_UPLOAD_LIMIT", "lots")], Args::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("INSPIRATIONS_DAILY_UPLOAD_LIMIT"));
    }

    #[test]
    fn admin_check_uses_list_and_domain() {
        let cfg = load(
            &[
                ("INSPIRATIONS_ADMIN_EMAILS", "Boss@Example.com, ops@partner.io"),
                ("INSPIRATIONS_ADMIN_DOMAIN", "@design.example"),
            ],
            Args::default(),
        )
        .unwrap();
        assert!(cfg.admin.is_admin("boss@example.com"));
        assert!(cfg.admin.is_admin("OPS@partner.io"));
        assert!(cfg.admin.is_admin("anyone@design.example"));
        assert!(!cfg.admin.is_admin("anyone@example.com"));
        assert!(!cfg.admin.is_admin("@design.example"));
        assert!(!cfg.admin.is_admin(""));
    }

    #[test]
    fn debug_output_hides_credentials() {
        let cfg = load(
            &[
                ("CRON_SECRET", "s3cr3t-token"),
                ("UPSTASH_REDIS_REST_URL", "https://kv.test"),
                ("UPSTASH_REDIS_REST_TOKEN", "kv-token"),
                ("GEMINI_API_KEY", "ai-key"),
            ],
            Args::default(),
        )
        .unwrap();
        assert!(cfg.cron_secret.is_some());
        let printed = format!("{:?}", cfg);
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("https://kv.test"));
        for secret in ["s3cr3t-token", "kv-token", "ai-key"] {
            assert!(!printed.contains(secret), "{} leaked", secret);
        }
    }
}
