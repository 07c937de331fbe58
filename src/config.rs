use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_QUOTA_LIMIT_BYTES: u64 = 100 * 1024 * 1024; // 100MB
pub const DEFAULT_MAX_SINGLE_UPLOAD_BYTES: u64 = 50 * 1024 * 1024; // 50MB
pub const DEFAULT_ALLOWED_EXTENSIONS: &str = "png,jpg,jpeg,gif,pdf,txt,docx,zip";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub storage: StorageConfig,
    pub store: StoreConfig,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub password_hash_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub remote_url: Option<String>,
    pub remote_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Remote,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "remote" => Ok(StorageBackend::Remote),
            other => bail!("Unsupported storage backend: {}", other),
        }
    }
}

/// Limits applied by the upload store to every user namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Total bytes a single user may keep stored.
    pub quota_limit_bytes: u64,
    /// Hard cap for one upload, independent of the quota.
    pub max_single_upload_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Serialize check-then-persist per user.
    pub serialize_user_writes: bool,
    /// Where incoming streams are spooled before they are admitted.
    pub staging_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quota_limit_bytes: DEFAULT_QUOTA_LIMIT_BYTES,
            max_single_upload_bytes: DEFAULT_MAX_SINGLE_UPLOAD_BYTES,
            allowed_extensions: parse_extensions(DEFAULT_ALLOWED_EXTENSIONS),
            serialize_user_writes: true,
            staging_dir: PathBuf::from("./uploads/.staging"),
        }
    }
}

impl StoreConfig {
    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions.iter().any(|allowed| *allowed == extension)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let remote_url = env::var("REMOTE_STORAGE_URL").ok();
        let backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse()?;
        if backend == StorageBackend::Remote && remote_url.is_none() {
            bail!("REMOTE_STORAGE_URL is required when STORAGE_BACKEND=remote");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/filehost.db?mode=rwc".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            storage: StorageConfig {
                backend,
                local_path: upload_dir.clone(),
                remote_url,
                remote_token: env::var("REMOTE_STORAGE_TOKEN").ok(),
            },
            store: StoreConfig {
                quota_limit_bytes: env::var("QUOTA_LIMIT_BYTES")
                    .unwrap_or_else(|_| DEFAULT_QUOTA_LIMIT_BYTES.to_string())
                    .parse()?,
                max_single_upload_bytes: env::var("MAX_SINGLE_UPLOAD_BYTES")
                    .unwrap_or_else(|_| DEFAULT_MAX_SINGLE_UPLOAD_BYTES.to_string())
                    .parse()?,
                allowed_extensions: parse_extensions(
                    &env::var("ALLOWED_EXTENSIONS")
                        .unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
                ),
                serialize_user_writes: env::var("SERIALIZE_USER_WRITES")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()?,
                staging_dir: env::var("STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(&upload_dir).join(".staging")),
            },
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key".to_string()),
            access_token_ttl_secs: env::var("ACCESS_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hour
                .parse()?,
            password_hash_cost: env::var("PASSWORD_HASH_COST")
                .unwrap_or_else(|_| bcrypt::DEFAULT_COST.to_string())
                .parse()?,
        })
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
