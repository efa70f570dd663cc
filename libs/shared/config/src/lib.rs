use std::env;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub storage_backend: StorageBackend,
    pub storage_timeout_seconds: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            storage_backend: match env::var("STORAGE_BACKEND").as_deref() {
                Ok("memory") => StorageBackend::Memory,
                Ok("supabase") | Err(_) => StorageBackend::Supabase,
                Ok(other) => {
                    warn!("Unknown STORAGE_BACKEND '{}', using supabase", other);
                    StorageBackend::Supabase
                }
            },
            storage_timeout_seconds: env::var("STORAGE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if config.storage_backend == StorageBackend::Supabase && !config.is_configured() {
            warn!("Supabase not fully configured - falling back to in-memory storage");
            config.storage_backend = StorageBackend::Memory;
        }

        config
    }

    /// Minimal config for tests and local runs against the in-memory stores.
    pub fn for_memory(jwt_secret: &str) -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: jwt_secret.to_string(),
            storage_backend: StorageBackend::Memory,
            storage_timeout_seconds: 10,
            server_port: 3000,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}
