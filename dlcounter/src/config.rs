use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{error::ConfigError, matcher::MatchConfig};

pub const DEFAULT_FILE_NAME: &str = "dlcounter.toml";

fn default_path_prefix() -> String {
    "/wp-content/uploads/".into()
}
fn default_methods() -> Vec<String> {
    vec!["GET".into()]
}
fn default_store() -> PathBuf {
    "downloads.db".into()
}
fn default_read_format() -> String {
    "%d/%b/%Y:%H:%M:%S %z".into()
}
fn default_write_format() -> String {
    "%a %d %b %H:%M".into()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DateTimeConfig {
    #[serde(default = "default_read_format")]
    pub read: String,
    #[serde(default = "default_write_format")]
    pub write: String,
}

impl Default for DateTimeConfig {
    fn default() -> Self {
        Self {
            read: default_read_format(),
            write: default_write_format(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Oldest first.
    #[serde(default)]
    pub access_logs: Vec<PathBuf>,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default)]
    pub file_suffixes: Vec<String>,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default)]
    pub webpage: Option<PathBuf>,
    #[serde(default)]
    pub datetime: DateTimeConfig,
}

/// Which settings must be present depends on how the run reads its logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    ConfiguredLogs,
    DiscoveredLogs,
}

/// Looks for the configuration file next to the executable.
pub fn default_path() -> PathBuf {
    std::env::current_exe()
        .map(|exe| exe.with_file_name(DEFAULT_FILE_NAME))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FILE_NAME))
}

impl Settings {
    /// Reads `path` (TOML) with a `DLCOUNTER__*` environment overlay and
    /// resolves relative paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix("DLCOUNTER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("access_logs")
                    .with_list_parse_key("file_suffixes")
                    .with_list_parse_key("methods"),
            )
            .build()?
            .try_deserialize()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(settings.relative_to(base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let resolve = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        self.access_logs = self.access_logs.iter().map(|p| resolve(p.as_path())).collect();
        self.store = resolve(self.store.as_path());
        self.webpage = self.webpage.as_deref().map(resolve);
        self
    }

    pub fn validate(mut self, requirement: Requirement) -> Result<Self, ConfigError> {
        if requirement == Requirement::ConfiguredLogs && self.access_logs.is_empty() {
            return Err(ConfigError::Missing("access_logs"));
        }
        if self.file_suffixes.is_empty() {
            return Err(ConfigError::Missing("file_suffixes"));
        }
        if self.file_suffixes.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "file_suffixes",
                reason: "suffixes cannot be empty strings".into(),
            });
        }
        if self.methods.is_empty() {
            return Err(ConfigError::Missing("methods"));
        }
        self.methods = self.methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        if self.store.as_os_str().is_empty() {
            return Err(ConfigError::Missing("store"));
        }
        check_format("datetime.read", &self.datetime.read)?;
        check_format("datetime.write", &self.datetime.write)?;
        Ok(self)
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            path_prefix: self.path_prefix.clone(),
            suffixes: self.file_suffixes.clone(),
            methods: self.methods.clone(),
            timestamp_format: self.datetime.read.clone(),
        }
    }
}

fn check_format(field: &'static str, format: &str) -> Result<(), ConfigError> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{format:?} is not a valid strftime format"),
        });
    }
    Ok(())
}
