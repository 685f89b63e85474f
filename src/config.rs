//! Layered configuration for Boardroom.
//!
//! Settings come from `boardroom.toml` (optional), then the environment
//! (a `.env` file is loaded by the binary through `dotenvy`), then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! cors_origins = ["http://localhost:5173"]
//! require_auth = false
//!
//! [storage]
//! backend = "auto"          # auto | sqlite | supabase
//! db_path = ".boardroom/boardroom.db"
//!
//! [supabase]
//! url = "https://project.supabase.co"
//! anon_key = "..."
//! service_key = "..."
//!
//! [llm]
//! provider = "gemini"       # gemini | openai
//! model = "gemini-2.0-flash"
//! temperature = 0.7
//!
//! [logging]
//! format = "pretty"         # pretty | json
//! directory = ".boardroom/logs"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "boardroom.toml";

const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardroomConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub supabase: SupabaseSettings,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Verify Supabase bearer tokens on every `/api` request.
    pub require_auth: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            require_auth: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Supabase when a URL is configured, SQLite otherwise.
    #[default]
    Auto,
    Sqlite,
    Supabase,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Auto => write!(f, "auto"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Supabase => write!(f, "supabase"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(StorageBackend::Auto),
            "sqlite" => Ok(StorageBackend::Sqlite),
            "supabase" => Ok(StorageBackend::Supabase),
            other => Err(ConfigError::Invalid {
                key: "storage.backend",
                message: format!("'{}' (valid values: auto, sqlite, supabase)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Auto,
            db_path: PathBuf::from(".boardroom/boardroom.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(ConfigError::Invalid {
                key: "llm.provider",
                message: format!("'{}' (valid values: gemini, openai)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// Model name sent to the provider (provider default when unset).
    pub model: Option<String>,
    /// Overrides the provider's public endpoint.
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                key: "logging.format",
                message: format!("'{}' (valid values: pretty, json)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Also write daily-rolling log files here.
    pub directory: Option<PathBuf>,
}

impl BoardroomConfig {
    /// Load the file layer (explicit path, or `boardroom.toml` when present)
    /// and apply the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables. `lookup` abstracts `std::env::var` so
    /// the layering can be exercised without touching the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                message: format!("{}", e),
            })?;
        }
        if let Some(host) = get("BOARDROOM_HOST") {
            self.server.host = host;
        }
        if let Some(flag) = get("BOARDROOM_REQUIRE_AUTH") {
            self.server.require_auth = parse_bool("BOARDROOM_REQUIRE_AUTH", &flag)?;
        }
        if let Some(backend) = get("BOARDROOM_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = get("BOARDROOM_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = Some(key);
        }
        if let Some(key) = get("SUPABASE_SERVICE_KEY") {
            self.supabase.service_key = Some(key);
        }
        if let Some(provider) = get("BOARDROOM_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(model) = get("BOARDROOM_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.llm.gemini_api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(format) = get("BOARDROOM_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(dir) = get("BOARDROOM_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// The backend actually used once `auto` is resolved.
    pub fn resolved_backend(&self) -> StorageBackend {
        match self.storage.backend {
            StorageBackend::Auto if self.supabase.url.is_some() => StorageBackend::Supabase,
            StorageBackend::Auto => StorageBackend::Sqlite,
            explicit => explicit,
        }
    }

    /// Every setting combination that cannot produce a working server.
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push(ConfigError::Invalid {
                key: "server.port",
                message: "port must be non-zero".to_string(),
            });
        }
        if self.server.cors_origins.iter().any(|o| o.trim().is_empty()) {
            problems.push(ConfigError::Invalid {
                key: "server.cors_origins",
                message: "origins must not be empty".to_string(),
            });
        }
        if self.resolved_backend() == StorageBackend::Supabase {
            if self.supabase.url.is_none() {
                problems.push(ConfigError::Missing { key: "SUPABASE_URL" });
            }
            if self.supabase.service_key.is_none() {
                problems.push(ConfigError::Missing {
                    key: "SUPABASE_SERVICE_KEY",
                });
            }
        }
        if self.server.require_auth {
            if self.supabase.url.is_none() {
                problems.push(ConfigError::Missing { key: "SUPABASE_URL" });
            }
            if self.supabase.anon_key.is_none() {
                problems.push(ConfigError::Missing {
                    key: "SUPABASE_ANON_KEY",
                });
            }
        }
        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                problems.push(ConfigError::Invalid {
                    key: "llm.temperature",
                    message: format!("{} is outside 0.0..=2.0", t),
                });
            }
        }

        problems
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut copy = self.clone();
        copy.supabase.anon_key = mask(&self.supabase.anon_key);
        copy.supabase.service_key = mask(&self.supabase.service_key);
        copy.llm.gemini_api_key = mask(&self.llm.gemini_api_key);
        copy.llm.openai_api_key = mask(&self.llm.openai_api_key);
        copy
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("'{}' is not a boolean", other),
        }),
    }
}
