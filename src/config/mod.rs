use crate::{OpsCoreError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Storage backend selection, read from `OPSCORE_STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen_addr: String,
    pub api_key: String,
    /// Origins allowed to make cross-origin requests against the HTTP
    /// surface. Defaults to localhost dev origins, never `*` — a
    /// control-plane API has no legitimate unknown-origin browser client.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub redis: Option<RedisConfig>,
    pub routing: RoutingConfig,
    pub http: HttpConfig,
    pub seed_workflows_dir: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from: {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {}", e),
        }

        let api_key = env::var("OPSCORE_API_KEY").map_err(|_| {
            OpsCoreError::ConfigurationError(
                "OPSCORE_API_KEY environment variable is required".to_string(),
            )
        })?;
        if api_key.trim().is_empty() {
            return Err(OpsCoreError::ConfigurationError(
                "OPSCORE_API_KEY cannot be empty".to_string(),
            ));
        }

        let storage_backend = match env::var("OPSCORE_STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "redis" => StorageBackend::Redis,
            other => {
                return Err(OpsCoreError::ConfigurationError(format!(
                    "unknown OPSCORE_STORAGE_BACKEND: {other}"
                )))
            }
        };

        let redis = if storage_backend == StorageBackend::Redis {
            let host = env::var("OPSCORE_REDIS_HOST").map_err(|_| {
                OpsCoreError::ConfigurationError(
                    "OPSCORE_REDIS_HOST is required when OPSCORE_STORAGE_BACKEND=redis"
                        .to_string(),
                )
            })?;
            let port = env::var("OPSCORE_REDIS_PORT")
                .map_err(|_| {
                    OpsCoreError::ConfigurationError(
                        "OPSCORE_REDIS_PORT is required when OPSCORE_STORAGE_BACKEND=redis"
                            .to_string(),
                    )
                })?
                .parse()
                .map_err(|_| {
                    OpsCoreError::ConfigurationError("OPSCORE_REDIS_PORT must be a port number".to_string())
                })?;
            let db = env::var("OPSCORE_REDIS_DB")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| {
                    OpsCoreError::ConfigurationError("OPSCORE_REDIS_DB must be an integer".to_string())
                })?;
            Some(RedisConfig { host, port, db })
        } else {
            None
        };

        let routing = RoutingConfig {
            base_url: env::var("OPSCORE_ROUTING_BASE_URL").map_err(|_| {
                OpsCoreError::ConfigurationError(
                    "OPSCORE_ROUTING_BASE_URL environment variable is required".to_string(),
                )
            })?,
            timeout_seconds: env::var("OPSCORE_ROUTING_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        };

        let allowed_origins = env::var("OPSCORE_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let http = HttpConfig {
            listen_addr: env::var("OPSCORE_HTTP_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            api_key,
            allowed_origins,
        };

        let seed_workflows_dir = env::var("OPSCORE_SEED_WORKFLOWS").ok();

        Ok(Config {
            storage_backend,
            redis,
            routing,
            http,
            seed_workflows_dir,
        })
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}
