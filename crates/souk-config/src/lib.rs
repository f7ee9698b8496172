use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub session_store: SessionStore,
    pub user_store: UserStore,
    pub commerce: Commerce,
    pub inference: Inference,
    pub dialogue: Dialogue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStore {
    #[serde(rename = "type")]
    pub kind: String,
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStore {
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commerce {
    pub base_url: String,
    pub token_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inference {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_inference_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_inference_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_similarity_threshold() -> f64 {
    0.7
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.session_store.kind != "memory" && cfg.session_store.kind != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "session_store.type={} is not implemented; supported: memory, sqlite",
            cfg.session_store.kind
        )));
    }
    if cfg.session_store.kind == "memory" && cfg.session_store.sqlite_path.is_some() {
        return Err(ConfigError::UnsupportedConfig(
            "session_store.sqlite_path is not supported when session_store.type=memory"
                .to_string(),
        ));
    }
    if cfg.session_store.kind == "sqlite"
        && cfg
            .session_store
            .sqlite_path
            .as_ref()
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::UnsupportedConfig(
            "session_store.sqlite_path is required when session_store.type=sqlite".to_string(),
        ));
    }
    if cfg.user_store.sqlite_path.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "user_store.sqlite_path must not be empty".to_string(),
        ));
    }
    if cfg.commerce.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "commerce.timeout_ms must be >= 1".to_string(),
        ));
    }
    if cfg.inference.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "inference.timeout_ms must be >= 1".to_string(),
        ));
    }
    if cfg.dialogue.max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "dialogue.max_attempts must be >= 1".to_string(),
        ));
    }
    if !(cfg.dialogue.similarity_threshold > 0.0 && cfg.dialogue.similarity_threshold <= 1.0) {
        return Err(ConfigError::UnsupportedConfig(
            "dialogue.similarity_threshold must be in (0, 1]".to_string(),
        ));
    }
    Ok(())
}
