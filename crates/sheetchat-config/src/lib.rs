use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_JOTFORM_BASE_URL: &str = "https://api.jotform.com";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HISTORY_TURNS: usize = 5;
const DEFAULT_MAX_CONTEXT_ROWS: usize = 20;
const DEFAULT_MAX_DOCUMENT_CHARS: usize = 8000;
const DEFAULT_SAMPLE_ROWS: usize = 5;

pub const DEFAULT_SHEET_NAME: &str = "datos";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable: {0}")]
    Missing(String),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[error("read catalog failed: {0}")]
    Read(String),
    #[error("parse catalog failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported catalog: {0}")]
    UnsupportedCatalog(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub model: Model,
    pub sheets: Sheets,
    pub limits: Limits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheets {
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub catalog: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SheetSource {
    Csv {
        url: String,
    },
    Jotform {
        api_key: String,
        form_id: String,
        #[serde(default = "default_jotform_base_url")]
        base_url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub source: SheetSource,
    #[serde(default)]
    pub date_column: Option<String>,
    #[serde(default)]
    pub rework_column: Option<String>,
    #[serde(default = "default_rework_values")]
    pub rework_values: Vec<String>,
    #[serde(default)]
    pub duration_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub history_turns: usize,
    pub max_context_rows: usize,
    pub max_document_chars: usize,
    pub sample_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    sheets: Vec<SheetEntry>,
}

fn default_jotform_base_url() -> String {
    DEFAULT_JOTFORM_BASE_URL.to_string()
}

fn default_rework_values() -> Vec<String> {
    ["si", "sí", "yes", "true", "1", "x", "retrabajo"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut catalog = match get("SHEETCHAT_CATALOG") {
            Some(path) => load_catalog(&path)?,
            None => Vec::new(),
        };
        if let Some(url) = get("SHEETCHAT_SHEET_URL") {
            catalog.push(SheetEntry {
                name: DEFAULT_SHEET_NAME.to_string(),
                label: None,
                synonyms: Vec::new(),
                source: SheetSource::Csv { url },
                date_column: None,
                rework_column: None,
                rework_values: default_rework_values(),
                duration_column: None,
            });
        }
        if let (Some(api_key), Some(form_id)) = (get("JOTFORM_API_KEY"), get("JOTFORM_FORM_ID")) {
            catalog.push(SheetEntry {
                name: "formularios".to_string(),
                label: Some("formulario".to_string()),
                synonyms: vec!["encuesta".to_string(), "respuestas".to_string()],
                source: SheetSource::Jotform {
                    api_key,
                    form_id,
                    base_url: default_jotform_base_url(),
                },
                date_column: Some("created_at".to_string()),
                rework_column: None,
                rework_values: default_rework_values(),
                duration_column: None,
            });
        }
        validate_catalog(&catalog)?;

        let cfg = Config {
            server: Server {
                listen_addr: get("SHEETCHAT_LISTEN_ADDR")
                    .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            },
            model: Model {
                api_key: get("GEMINI_API_KEY").unwrap_or_default(),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            },
            sheets: Sheets {
                cache_ttl_secs: parse_or(
                    "SHEETCHAT_CACHE_TTL_SECS",
                    get("SHEETCHAT_CACHE_TTL_SECS"),
                    DEFAULT_CACHE_TTL_SECS,
                )?,
                fetch_timeout_secs: parse_or(
                    "SHEETCHAT_FETCH_TIMEOUT_SECS",
                    get("SHEETCHAT_FETCH_TIMEOUT_SECS"),
                    DEFAULT_FETCH_TIMEOUT_SECS,
                )?,
                catalog,
            },
            limits: Limits {
                history_turns: parse_or(
                    "SHEETCHAT_HISTORY_TURNS",
                    get("SHEETCHAT_HISTORY_TURNS"),
                    DEFAULT_HISTORY_TURNS,
                )?,
                max_context_rows: parse_or(
                    "SHEETCHAT_MAX_CONTEXT_ROWS",
                    get("SHEETCHAT_MAX_CONTEXT_ROWS"),
                    DEFAULT_MAX_CONTEXT_ROWS,
                )?,
                max_document_chars: parse_or(
                    "SHEETCHAT_MAX_DOCUMENT_CHARS",
                    get("SHEETCHAT_MAX_DOCUMENT_CHARS"),
                    DEFAULT_MAX_DOCUMENT_CHARS,
                )?,
                sample_rows: parse_or(
                    "SHEETCHAT_SAMPLE_ROWS",
                    get("SHEETCHAT_SAMPLE_ROWS"),
                    DEFAULT_SAMPLE_ROWS,
                )?,
            },
        };
        validate_runtime_support(&cfg)?;
        Ok(cfg)
    }

    pub fn require_model_key(&self) -> Result<(), ConfigError> {
        if self.model.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("GEMINI_API_KEY".to_string()));
        }
        Ok(())
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

pub fn load_catalog(path: &str) -> Result<Vec<SheetEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    parse_catalog(&text)
}

pub fn parse_catalog(text: &str) -> Result<Vec<SheetEntry>, ConfigError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let file: CatalogFile =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(file.sheets)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/catalog.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/catalog.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "catalog schema not found at config/catalog.schema.json or workspace config path"
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

fn validate_catalog(catalog: &[SheetEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in catalog {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::UnsupportedCatalog(
                "sheet name must not be empty".to_string(),
            ));
        }
        if !seen.insert(entry.name.to_lowercase()) {
            return Err(ConfigError::UnsupportedCatalog(format!(
                "duplicate sheet name: {}",
                entry.name
            )));
        }
        match &entry.source {
            SheetSource::Csv { url } if url.trim().is_empty() => {
                return Err(ConfigError::UnsupportedCatalog(format!(
                    "sheet {} has an empty csv url",
                    entry.name
                )));
            }
            SheetSource::Jotform {
                api_key, form_id, ..
            } if api_key.trim().is_empty() || form_id.trim().is_empty() => {
                return Err(ConfigError::UnsupportedCatalog(format!(
                    "sheet {} needs both api_key and form_id",
                    entry.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.sheets.cache_ttl_secs == 0 {
        return Err(ConfigError::Invalid {
            key: "SHEETCHAT_CACHE_TTL_SECS".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
    if cfg.sheets.fetch_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            key: "SHEETCHAT_FETCH_TIMEOUT_SECS".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
    if cfg.limits.history_turns == 0 {
        return Err(ConfigError::Invalid {
            key: "SHEETCHAT_HISTORY_TURNS".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
    Ok(())
}
