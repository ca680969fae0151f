//! Persisted connection settings for repeated CLI runs.
//!
//! A small JSON file holding the endpoint, model and sampling knobs so a user
//! does not retype `--base-url` and `--api-key` on every invocation:
//!
//! ```json
//! {
//!   "base_url": "https://api.deepseek.com",
//!   "api_key": "c2stLi4u",
//!   "model": "deepseek-chat",
//!   "dpi": 300,
//!   "max_tokens": 2000,
//!   "temperature": 0.1,
//!   "version": "1.0"
//! }
//! ```
//!
//! The API key is base64-encoded on disk. That only keeps it from being read
//! at a glance; it is not encryption. Missing keys load as defaults and a key
//! that fails to decode loads as empty.

use crate::config::ExtractionConfigBuilder;
use crate::error::Pdf2TocError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default file name, resolved against the working directory.
pub const SETTINGS_FILE: &str = "pdf2toc_config.json";

/// Environment variable overriding the settings location.
pub const SETTINGS_PATH_ENV: &str = "PDF2TOC_CONFIG";

const SETTINGS_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    #[serde(serialize_with = "obfuscate", deserialize_with = "deobfuscate")]
    pub api_key: String,
    pub model: String,
    pub dpi: u32,
    pub max_tokens: usize,
    pub temperature: f32,
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            dpi: 300,
            max_tokens: 2000,
            temperature: 0.1,
            version: SETTINGS_VERSION.to_string(),
        }
    }
}

fn obfuscate<S: Serializer>(key: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(key.as_bytes()))
}

fn deobfuscate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if encoded.is_empty() {
        return Ok(String::new());
    }
    let decoded = STANDARD
        .decode(encoded.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    Ok(decoded.unwrap_or_else(|| {
        warn!("Stored API key could not be decoded; ignoring it");
        String::new()
    }))
}

impl Settings {
    /// `$PDF2TOC_CONFIG`, else [`SETTINGS_FILE`] in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Load settings, or `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, Pdf2TocError> {
        if !path.exists() {
            return Ok(None);
        }
        let settings_err = |detail: String| Pdf2TocError::Settings {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| settings_err(e.to_string()))?;
        let settings: Settings =
            serde_json::from_str(&text).map_err(|e| settings_err(format!("invalid JSON: {e}")))?;
        info!("Settings loaded from {}", path.display());
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<(), Pdf2TocError> {
        let settings_err = |detail: String| Pdf2TocError::Settings {
            path: path.to_path_buf(),
            detail,
        };
        let mut stored = self.clone();
        stored.version = SETTINGS_VERSION.to_string();
        let json =
            serde_json::to_string_pretty(&stored).map_err(|e| settings_err(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| settings_err(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| settings_err(e.to_string()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Delete the settings file. Returns whether one existed.
    pub fn clear(path: &Path) -> Result<bool, Pdf2TocError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Settings cleared at {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Pdf2TocError::Settings {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }

    /// Seed a config builder. An empty stored key leaves the builder's key unset.
    pub fn apply(&self, builder: ExtractionConfigBuilder) -> ExtractionConfigBuilder {
        let builder = builder
            .base_url(&self.base_url)
            .model(&self.model)
            .dpi(self.dpi)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.api_key(&self.api_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    #[test]
    fn defaults_match_deepseek_setup() {
        let s = Settings::default();
        assert_eq!(s.base_url, "https://api.deepseek.com");
        assert_eq!(s.model, "deepseek-chat");
        assert_eq!(s.dpi, 300);
        assert_eq!(s.max_tokens, 2000);
        assert!(s.api_key.is_empty());
    }

    #[test]
    fn key_is_base64_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let s = Settings {
            api_key: "sk-abc123".into(),
            ..Settings::default()
        };
        s.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-abc123"));
        assert!(raw.contains(&STANDARD.encode("sk-abc123")));
        assert!(raw.contains(r#""version": "1.0""#));

        assert_eq!(Settings::load(&path).unwrap(), Some(s));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"model": "gpt-4o"}"#).unwrap();

        let s = Settings::load(&path).unwrap().unwrap();
        assert_eq!(s.model, "gpt-4o");
        assert_eq!(s.base_url, "https://api.deepseek.com");
        assert_eq!(s.max_tokens, 2000);
    }

    #[test]
    fn undecodable_key_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"api_key": "%%% not base64 %%%"}"#).unwrap();
        assert!(Settings::load(&path).unwrap().unwrap().api_key.is_empty());
    }

    #[test]
    fn invalid_json_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Settings::load(&path), Err(Pdf2TocError::Settings { .. })));
    }

    #[test]
    fn absent_file_loads_none_and_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        assert!(!Settings::exists(&path));
        assert_eq!(Settings::load(&path).unwrap(), None);

        Settings::default().save(&path).unwrap();
        assert!(Settings::exists(&path));
        assert!(Settings::clear(&path).unwrap());
        assert!(!Settings::clear(&path).unwrap());
    }

    #[test]
    fn apply_seeds_builder() {
        let s = Settings {
            api_key: "sk-x".into(),
            dpi: 150,
            ..Settings::default()
        };
        let config = s.apply(ExtractionConfig::builder()).build().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://api.deepseek.com"));
        assert_eq!(config.api_key.as_deref(), Some("sk-x"));
        assert_eq!(config.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(config.dpi, 150);

        let no_key = Settings::default().apply(ExtractionConfig::builder()).build().unwrap();
        assert!(no_key.api_key.is_none());
    }
}
