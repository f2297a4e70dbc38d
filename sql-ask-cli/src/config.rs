use std::{
    env,
    error::Error,
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use sql_ask_core::{
    backend::ConnectOptions,
    cleaner::{KeywordMatch, SqlExtractor},
    export::CsvExporter,
    llm::ModelOptions,
    prompt::{Dialect, PromptTemplate},
};
use tracing::{info, warn};

const DATABASE_URL: &str = "DATABASE_URL";
pub const DEFAULT_CONFIG: &str = "sql-ask.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub enum ConfigError {
    DbUrlNotFound,
    InvalidTemplate { path: PathBuf, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::DbUrlNotFound => write!(
                f,
                "Database URL not found, please set the {DATABASE_URL} environment variable or [database] url in {DEFAULT_CONFIG}."
            ),
            ConfigError::InvalidTemplate { path, message } => {
                write!(f, "Invalid prompt template {}: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    /// Takes precedence over `DATABASE_URL`.
    pub url: Option<String>,
    /// Schema to describe; the backend default when unset.
    pub owner: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            owner: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    /// A zero timeout would fail every query, so it falls back to the default.
    pub fn connect_options(&self) -> ConnectOptions {
        let secs = match self.timeout_secs {
            0 => {
                warn!("Invalid database timeout 0, using {DEFAULT_TIMEOUT_SECS}s");
                DEFAULT_TIMEOUT_SECS
            }
            secs => secs,
        };
        ConnectOptions {
            timeout: Duration::from_secs(secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PromptConfig {
    pub dialect: Option<Dialect>,
    pub template_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractionConfig {
    pub keyword_match: KeywordMatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExportConfig {
    /// Directory for the result file; the system temp directory when unset.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
#[must_use]
pub struct TomlConfig {
    pub database: DatabaseConfig,
    pub model: ModelOptions,
    pub prompt: PromptConfig,
    pub extraction: ExtractionConfig,
    pub export: ExportConfig,
}

fn resolve_db_url(configured: Option<&str>, from_env: Option<String>) -> Result<String, ConfigError> {
    // A blank configured url counts as unset.
    configured
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
        .or_else(|| from_env.filter(|url| !url.trim().is_empty()))
        .ok_or(ConfigError::DbUrlNotFound)
}

impl TomlConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !std::fs::exists(path)? {
            info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).map_err(|error| {
            format!(
                "encountered '{error}' attempting to read {}",
                path.display()
            )
        })?;
        Ok(toml::from_slice(&bytes)?)
    }

    pub fn db_url(&self) -> Result<String, ConfigError> {
        // A missing .env file is not an error.
        let _ = dotenv();
        resolve_db_url(self.database.url.as_deref(), env::var(DATABASE_URL).ok())
    }

    /// The configured template file, else the built-in template for the
    /// configured dialect, else the one matching `backend`.
    pub fn template(&self, backend: &str) -> Result<PromptTemplate, ConfigError> {
        if let Some(path) = &self.prompt.template_path {
            let invalid = |message: String| ConfigError::InvalidTemplate {
                path: path.clone(),
                message,
            };
            let text = std::fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
            return PromptTemplate::from_text(text).map_err(|err| invalid(err.to_string()));
        }
        let dialect = self
            .prompt
            .dialect
            .or_else(|| Dialect::for_backend(backend))
            .unwrap_or(Dialect::Sqlite);
        Ok(PromptTemplate::for_dialect(dialect))
    }

    pub fn extractor(&self) -> SqlExtractor {
        SqlExtractor::new(self.extraction.keyword_match)
    }

    pub fn exporter(&self) -> CsvExporter {
        match &self.export.directory {
            Some(directory) => CsvExporter::new(directory),
            None => CsvExporter::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sql_ask_core::prompt::SCHEMA_PLACEHOLDER;

    use super::*;

    #[test]
    fn parses_full_config() {
        let config: TomlConfig = toml::from_str(
            r#"
[database]
url = "sqlite://northwind.db"
owner = "main"
timeout-secs = 5

[model]
name = "qwen2.5-coder:7b"
base-url = "http://gpu-box:11434"
temperature = 0.0
max-tokens = 256

[prompt]
dialect = "postgres"

[extraction]
keyword-match = "word-boundary"

[export]
directory = "/tmp/sql-ask"
"#,
        )
        .unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite://northwind.db"));
        assert_eq!(
            config.database.connect_options().timeout,
            Duration::from_secs(5)
        );
        assert_eq!(config.model.name, "qwen2.5-coder:7b");
        assert_eq!(config.model.max_tokens, 256);
        assert_eq!(config.model.top_k, 40);
        assert_eq!(config.prompt.dialect, Some(Dialect::Postgres));
        assert_eq!(config.extraction.keyword_match, KeywordMatch::WordBoundary);
        assert_eq!(
            config.exporter().path(),
            PathBuf::from("/tmp/sql-ask/sql_ask_query_result.csv")
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.timeout_secs, 30);
        assert_eq!(config.model, ModelOptions::default());
        assert_eq!(config.extraction.keyword_match, KeywordMatch::Substring);
    }

    #[test]
    fn default_config_round_trips() {
        let text = toml::to_string_pretty(&TomlConfig::default()).unwrap();
        let config: TomlConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.model, ModelOptions::default());
    }

    #[test]
    fn configured_url_wins_over_env() {
        assert_eq!(
            resolve_db_url(Some("sqlite://a.db"), Some("postgres://b".into())).unwrap(),
            "sqlite://a.db"
        );
        assert_eq!(
            resolve_db_url(None, Some("postgres://b".into())).unwrap(),
            "postgres://b"
        );
        assert!(matches!(
            resolve_db_url(None, None),
            Err(ConfigError::DbUrlNotFound)
        ));
        assert!(resolve_db_url(Some("  "), None).is_err());
    }

    #[test]
    fn blank_configured_url_falls_back_to_env() {
        assert_eq!(
            resolve_db_url(Some("  "), Some("postgres://b".into())).unwrap(),
            "postgres://b"
        );
        assert_eq!(
            resolve_db_url(Some(""), Some("sqlite::memory:".into())).unwrap(),
            "sqlite::memory:"
        );
        assert!(resolve_db_url(Some(""), Some(" ".into())).is_err());
    }

    #[test]
    fn zero_timeout_uses_default() {
        let config: TomlConfig = toml::from_str("[database]\ntimeout-secs = 0\n").unwrap();
        assert_eq!(
            config.database.connect_options().timeout,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn dialect_follows_backend() {
        let config = TomlConfig::default();
        let postgres = config.template("postgres").unwrap();
        assert!(postgres.text().contains("PostgreSQL"));
        let fallback = config.template("unknown").unwrap();
        assert_eq!(fallback, PromptTemplate::default());
    }

    #[test]
    fn loads_template_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Şema: {{schema}}\nSoru: {{query}}").unwrap();
        let mut config = TomlConfig::default();
        config.prompt.template_path = Some(file.path().to_path_buf());
        let template = config.template("sqlite").unwrap();
        assert_eq!(template.build("S", "Q"), "Şema: S\nSoru: Q");
    }

    #[test]
    fn rejects_template_without_schema() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Soru: {{query}}").unwrap();
        let mut config = TomlConfig::default();
        config.prompt.template_path = Some(file.path().to_path_buf());
        let err = config.template("sqlite").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
        assert!(err.to_string().contains(SCHEMA_PLACEHOLDER));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TomlConfig::load(&dir.path().join(DEFAULT_CONFIG)).unwrap();
        assert!(config.database.url.is_none());
    }
}
