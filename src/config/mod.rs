//! Configuration Module
//!
//! Loads the sorter configuration from `~/.config/smartsort/config.json` and hands out
//! immutable snapshots. A reload swaps the snapshot; pipelines that already hold one keep it.
//!
//! Rule tables are ordered. They may be written either as JSON objects (read in document
//! order) or as arrays of rule objects.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Folder used when no rule matches
pub const FALLBACK_FOLDER: &str = "Others";

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Keyword -> folder rule, matched against extracted text and file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticRule {
    pub keyword: String,
    pub folder: String,
}

/// Folder -> extensions rule, used when no semantic rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRule {
    pub folder: String,
    pub extensions: Vec<String>,
}

impl ExtensionRule {
    /// Whether this rule covers an extension (lower-case, leading dot)
    pub fn matches(&self, extension: &str) -> bool {
        !extension.is_empty() && self.extensions.iter().any(|e| e == extension)
    }
}

/// Ordered rule tables consulted by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    pub semantic_rules: Vec<SemanticRule>,
    pub extension_rules: Vec<ExtensionRule>,
}

impl RuleSet {
    /// Rule tables of the original SmartSort configuration
    pub fn builtin() -> Self {
        let semantic = [
            ("invoice", "Financial/Invoices"),
            ("receipt", "Financial/Receipts"),
            ("resume", "HR/Resumes"),
            ("report", "Work/Reports"),
            ("assignment", "University/Assignments"),
        ];
        let extensions: [(&str, &[&str]); 6] = [
            ("Images", &[".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp"]),
            ("Documents", &[".pdf", ".docx", ".txt", ".xlsx", ".pptx", ".csv"]),
            ("Audio", &[".mp3", ".wav", ".aac"]),
            ("Video", &[".mp4", ".mkv", ".mov", ".avi"]),
            ("Archives", &[".zip", ".rar", ".7z", ".tar", ".gz"]),
            ("Installers", &[".exe", ".msi", ".dmg", ".pkg"]),
        ];

        Self {
            semantic_rules: semantic
                .iter()
                .map(|(keyword, folder)| SemanticRule {
                    keyword: keyword.to_string(),
                    folder: folder.to_string(),
                })
                .collect(),
            extension_rules: extensions
                .iter()
                .map(|(folder, exts)| ExtensionRule {
                    folder: folder.to_string(),
                    extensions: exts.iter().map(|e| e.to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Lower-case keywords and extensions, add missing leading dots, and drop rules
    /// whose folder is empty or would escape the target root.
    pub fn normalized(self) -> Self {
        let semantic_rules = self
            .semantic_rules
            .into_iter()
            .filter_map(|rule| {
                let keyword = rule.keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    tracing::warn!(folder = %rule.folder, "Dropping semantic rule with empty keyword");
                    return None;
                }
                if !is_safe_folder(&rule.folder) {
                    tracing::warn!(folder = %rule.folder, "Dropping semantic rule with unsafe folder");
                    return None;
                }
                Some(SemanticRule {
                    keyword,
                    folder: rule.folder.trim().to_string(),
                })
            })
            .collect();

        let extension_rules = self
            .extension_rules
            .into_iter()
            .filter_map(|rule| {
                if !is_safe_folder(&rule.folder) {
                    tracing::warn!(folder = %rule.folder, "Dropping extension rule with unsafe folder");
                    return None;
                }
                let extensions = rule
                    .extensions
                    .iter()
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty() && e != ".")
                    .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
                    .collect();
                Some(ExtensionRule {
                    folder: rule.folder.trim().to_string(),
                    extensions,
                })
            })
            .collect();

        Self {
            semantic_rules,
            extension_rules,
        }
    }
}

/// A destination folder must be a non-empty relative path made of normal components
pub fn is_safe_folder(folder: &str) -> bool {
    let folder = folder.trim();
    if folder.is_empty() {
        return false;
    }
    Path::new(folder)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

/// Full sorter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory that sorted files are moved into
    pub target_dir: PathBuf,
    /// Directories watched for new files (non-recursive)
    pub watch_dirs: Vec<PathBuf>,
    /// Extract document text for classification
    pub deep_scan: bool,
    /// Sort files already present in the watched directories at startup
    pub startup_cleanup: bool,
    /// Ask the external renamer for a name
    pub ai_renaming: bool,
    /// Build `{DocType}_{Entity}_{Date}` names from extracted text
    pub heuristic_renaming: bool,
    /// Prefix files sorted into financial folders with the keyword and today's date
    pub financial_date_stamp: bool,
    /// API key for the external renamer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_renamer_credential: Option<String>,
    #[serde(deserialize_with = "deserialize_semantic_rules")]
    pub semantic_rules: Vec<SemanticRule>,
    #[serde(deserialize_with = "deserialize_extension_rules")]
    pub extension_rules: Vec<ExtensionRule>,
    /// Delay between two size observations
    pub stability_poll_ms: u64,
    /// Number of size observations before giving up on a file
    pub stability_max_attempts: u32,
    /// Byte budget for extracted text
    pub max_text_bytes: usize,
    /// Upper bound on concurrently processed files (0 = 2 x CPU count)
    pub max_workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));
        let downloads = dirs::download_dir().unwrap_or_else(|| home.join("Downloads"));
        let desktop = dirs::desktop_dir().unwrap_or_else(|| home.join("Desktop"));
        let rules = RuleSet::builtin();

        Self {
            target_dir: documents.join("SmartSort_Vault"),
            watch_dirs: vec![downloads, desktop],
            deep_scan: true,
            startup_cleanup: true,
            ai_renaming: false,
            heuristic_renaming: false,
            financial_date_stamp: true,
            external_renamer_credential: None,
            semantic_rules: rules.semantic_rules,
            extension_rules: rules.extension_rules,
            stability_poll_ms: 500,
            stability_max_attempts: 30,
            max_text_bytes: 2000,
            max_workers: 0,
        }
    }
}

impl AppConfig {
    /// Ordered rule snapshot. Rules are normalized once, when the config is loaded.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            semantic_rules: self.semantic_rules.clone(),
            extension_rules: self.extension_rules.clone(),
        }
    }

    /// Normalize the rule tables in place, dropping unusable rules
    pub fn with_normalized_rules(mut self) -> Self {
        let rules = RuleSet {
            semantic_rules: std::mem::take(&mut self.semantic_rules),
            extension_rules: std::mem::take(&mut self.extension_rules),
        }
        .normalized();
        self.semantic_rules = rules.semantic_rules;
        self.extension_rules = rules.extension_rules;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stability_poll_ms)
    }

    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get() * 2
        } else {
            self.max_workers
        }
    }

    /// Parse a config document and normalize its rules
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::with_normalized_rules)
    }
}

/// Rule table as written in config.json: an ordered object or an array
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTable<T> {
    List(Vec<T>),
    Map(serde_json::Map<String, serde_json::Value>),
}

fn deserialize_semantic_rules<'de, D>(deserializer: D) -> Result<Vec<SemanticRule>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawTable::<SemanticRule>::deserialize(deserializer)? {
        RawTable::List(rules) => Ok(rules),
        RawTable::Map(map) => map
            .into_iter()
            .map(|(keyword, folder)| match folder {
                serde_json::Value::String(folder) => Ok(SemanticRule { keyword, folder }),
                other => Err(D::Error::custom(format!(
                    "semantic rule '{}' must map to a folder string, got {}",
                    keyword, other
                ))),
            })
            .collect(),
    }
}

fn deserialize_extension_rules<'de, D>(deserializer: D) -> Result<Vec<ExtensionRule>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawTable::<ExtensionRule>::deserialize(deserializer)? {
        RawTable::List(rules) => Ok(rules),
        RawTable::Map(map) => map
            .into_iter()
            .map(|(folder, extensions)| {
                serde_json::from_value::<Vec<String>>(extensions)
                    .map(|extensions| ExtensionRule { folder, extensions })
                    .map_err(D::Error::custom)
            })
            .collect(),
    }
}

/// Holds the current configuration snapshot
pub struct ConfigStore {
    /// Backing file; `None` for in-memory stores
    path: Option<PathBuf>,
    current: RwLock<Arc<AppConfig>>,
}

impl ConfigStore {
    /// Default config location (~/.config/smartsort/config.json)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("smartsort").join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from a file. A missing file is created with defaults; a malformed one
    /// is left alone and defaults are used.
    pub fn open(path: PathBuf) -> Self {
        let config = match Self::read_file(&path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                let config = AppConfig::default();
                if let Err(e) = Self::write_file(&path, &config) {
                    tracing::warn!(error = %e, "Could not write default config");
                }
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to built-in configuration");
                AppConfig::default()
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// In-memory store (tests, embedding)
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config.with_normalized_rules())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<AppConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new snapshot
    pub fn replace(&self, config: AppConfig) {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Config lock was poisoned, recovering...");
            poisoned.into_inner()
        });
        *guard = Arc::new(config.with_normalized_rules());
    }

    /// Re-read the backing file. On failure the current snapshot is kept.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        match Self::read_file(path)? {
            Some(config) => {
                tracing::info!(path = %path.display(), "Configuration reloaded");
                self.replace(config);
            }
            None => tracing::debug!(path = %path.display(), "Config file missing, keeping current"),
        }
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        AppConfig::from_json(&json)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write_file(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        fs::write(path, json).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_object_rules_keep_document_order() {
        let json = r#"{
            "semantic_rules": { "zeta": "Z", "alpha": "A", "mid": "M" },
            "extension_rules": { "Pics": ["PNG", "jpg"], "Docs": [".pdf"] }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        let keywords: Vec<_> = config.semantic_rules.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, ["zeta", "alpha", "mid"]);

        let rules = config.rule_set();
        assert_eq!(rules.extension_rules[0].folder, "Pics");
        assert_eq!(rules.extension_rules[0].extensions, [".png", ".jpg"]);
    }

    #[test]
    fn test_array_rules_are_accepted() {
        let json = r#"{
            "semantic_rules": [{ "keyword": "Invoice", "folder": "Financial/Invoices" }]
        }"#;
        let rules = AppConfig::from_json(json).unwrap().rule_set();
        assert_eq!(rules.semantic_rules[0].keyword, "invoice");
        // Unspecified tables keep their defaults
        assert_eq!(rules.extension_rules.len(), 6);
    }

    #[test]
    fn test_unsafe_folders_are_dropped() {
        let rules = RuleSet {
            semantic_rules: vec![
                SemanticRule { keyword: "a".into(), folder: "../escape".into() },
                SemanticRule { keyword: "b".into(), folder: "/abs".into() },
                SemanticRule { keyword: "".into(), folder: "Empty".into() },
                SemanticRule { keyword: "c".into(), folder: "Fine/Nested".into() },
            ],
            extension_rules: vec![],
        }
        .normalized();
        assert_eq!(rules.semantic_rules.len(), 1);
        assert_eq!(rules.semantic_rules[0].folder, "Fine/Nested");
    }

    #[test]
    fn test_rules_are_normalized_when_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "semantic_rules": { "Invoice": "Financial", "trap": "../../etc" },
                "extension_rules": { "Pics": ["PNG"] }
            }"#,
        )
        .unwrap();

        let snapshot = ConfigStore::open(path).snapshot();
        assert_eq!(
            snapshot.semantic_rules,
            [SemanticRule { keyword: "invoice".into(), folder: "Financial".into() }]
        );
        assert_eq!(snapshot.extension_rules[0].extensions, [".png"]);
        // Nothing left to normalize per file
        assert_eq!(snapshot.rule_set(), snapshot.rule_set().normalized());
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = ConfigStore::open(path.clone());
        assert!(path.exists());
        assert!(store.snapshot().deep_scan);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::open(path.clone());
        assert_eq!(store.snapshot().semantic_rules, RuleSet::builtin().semantic_rules);
        // The broken file is left for the user to fix
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "deep_scan": true }"#).unwrap();

        let store = ConfigStore::open(path.clone());
        let before = store.snapshot();

        fs::write(&path, r#"{ "deep_scan": false }"#).unwrap();
        store.reload().unwrap();

        assert!(before.deep_scan, "held snapshot must not change");
        assert!(!store.snapshot().deep_scan);
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "max_text_bytes": 10 }"#).unwrap();
        let store = ConfigStore::open(path.clone());

        fs::write(&path, "garbage").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().max_text_bytes, 10);
    }
}
