use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported DATABASE_PROVIDER '{0}' (expected mongo, mongodb or firestore)")]
    InvalidProvider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub filter: FilterConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Raw `DATABASE_PROVIDER` value; validated when the store is connected.
    pub provider: String,
    pub uri: String,
    pub name: String,
    pub firestore: FirestoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: Option<String>,
    pub database: String,
    /// Service account JSON. When absent, tokens come from the GCE metadata server.
    pub credentials_path: Option<String>,
    pub emulator_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Expected `aud` claim; not enforced when empty.
    pub audience: Option<String>,
    pub identity_lookup_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the access service. `MQTT_SERVICE_API_URL`, else `PROJECT_SERVICE_API_URL`.
    pub mqtt_service_url: String,
    pub timeout_secs: u64,
}

const DEFAULT_DB_NAME: &str = "sit-iot-message-mng";
const DEFAULT_IDENTITY_LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process environment in production).
    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match var("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(var)
    }

    fn with_overrides<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Server overrides
        if let Some(v) = var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = var("CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        // Filter overrides
        if let Some(v) = var("QUERY_MAX_LIMIT") {
            self.filter.max_limit = v.parse().ok().filter(|n| *n > 0).unwrap_or(self.filter.max_limit);
        }

        // Database overrides
        if let Some(v) = var("DATABASE_PROVIDER") {
            self.database.provider = v.to_lowercase();
        }
        if let Some(v) = var("DB_URI_MESSAGE_MNG") {
            self.database.uri = v;
        }
        if let Some(v) = var("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = var("FIREBASE_CREDENTIALS_PATH") {
            self.database.firestore.credentials_path = Some(v);
        }
        if let Some(v) = var("FIRESTORE_PROJECT_ID").or_else(|| var("GOOGLE_CLOUD_PROJECT")) {
            self.database.firestore.project_id = Some(v);
        }
        if let Some(v) = var("FIRESTORE_DATABASE") {
            self.database.firestore.database = v;
        }
        if let Some(v) = var("FIRESTORE_EMULATOR_HOST") {
            self.database.firestore.emulator_host = Some(v);
        }

        // Auth overrides
        if let Some(v) = var("AUTH_API_KEY") {
            self.auth.api_key = v;
        }
        if let Some(v) = var("AUDIENCE") {
            self.auth.audience = Some(v);
        }
        if let Some(v) = var("IDENTITY_LOOKUP_URL") {
            self.auth.identity_lookup_url = v;
        }

        // Upstream overrides
        if let Some(v) = var("MQTT_SERVICE_API_URL").or_else(|| var("PROJECT_SERVICE_API_URL")) {
            self.upstream.mqtt_service_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = v.parse().unwrap_or(self.upstream.timeout_secs);
        }

        self
    }

    fn base(environment: Environment, max_limit: u64, cors_origins: Vec<String>) -> Self {
        Self {
            environment,
            server: ServerConfig {
                port: 8080,
                cors_origins,
            },
            filter: FilterConfig { max_limit },
            database: DatabaseConfig {
                provider: "mongo".to_string(),
                uri: format!("mongodb://localhost:27017/{}", DEFAULT_DB_NAME),
                name: DEFAULT_DB_NAME.to_string(),
                firestore: FirestoreConfig {
                    database: "(default)".to_string(),
                    ..Default::default()
                },
            },
            auth: AuthConfig {
                api_key: String::new(),
                audience: None,
                identity_lookup_url: DEFAULT_IDENTITY_LOOKUP_URL.to_string(),
            },
            upstream: UpstreamConfig {
                mqtt_service_url: "http://localhost".to_string(),
                timeout_secs: 30,
            },
        }
    }

    fn development() -> Self {
        Self::base(
            Environment::Development,
            1000,
            vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
        )
    }

    fn staging() -> Self {
        Self::base(Environment::Staging, 500, vec!["https://staging.example.com".to_string()])
    }

    fn production() -> Self {
        Self::base(Environment::Production, 200, vec!["https://app.example.com".to_string()])
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}
