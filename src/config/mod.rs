//! Configuration management using the prefer crate for file discovery.

mod collection;
mod scraper;

pub use collection::{
    CollectionSettings, ScrapingConfig, DEFAULT_BOARDS, DEFAULT_MAX_THREADS,
    DEFAULT_MIN_POST_COUNT,
};
pub use scraper::{PageValidationRules, ScraperSettings, DEFAULT_DIRECTORY_SOURCES, DEFAULT_SERVER};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "matome.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// File-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path for collected threads and posts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub scraper: ScraperSettings,
    /// Used when the database holds no collection settings yet.
    pub collection: CollectionSettings,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers matome config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("matome").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the format implied by a file extension.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Resolve the database path: explicit override, then config, then the
    /// default file next to the config (or in the working directory).
    pub fn database_path(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        let base = self
            .source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        match self.database {
            Some(ref db) if Path::new(db).is_absolute() => PathBuf::from(db),
            Some(ref db) => base.join(db),
            None => base.join(DEFAULT_DATABASE_FILENAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = Config::parse(
            r#"
            database = "data/matome.db"

            [scraper]
            board_delay_ms = 2000
            fallback_servers = ["https://egg.2ch.sc"]

            [collection]
            target_boards = ["newsplus"]
            min_post_count = 500
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(config.scraper.board_delay_ms, 2000);
        assert_eq!(config.scraper.fallback_servers, vec!["https://egg.2ch.sc"]);
        assert_eq!(config.collection.target_boards, vec!["newsplus"]);
        assert_eq!(config.collection.min_post_count, 500);
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse("scraper:\n  max_redirects: 5\n", "yml").unwrap();
        assert_eq!(yaml.scraper.max_redirects, 5);

        let json = Config::parse(r#"{"collection":{"max_threads":3}}"#, "json").unwrap();
        assert_eq!(json.collection.max_threads, 3);
        assert_eq!(json.collection.min_post_count, DEFAULT_MIN_POST_COUNT);
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse("scraper = [", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[test]
    fn test_database_path_is_relative_to_config_file() {
        let config = Config {
            database: Some("collected.db".into()),
            source_path: Some(PathBuf::from("/etc/matome/matome.toml")),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(None),
            PathBuf::from("/etc/matome/collected.db")
        );
        assert_eq!(
            config.database_path(Some(Path::new("/tmp/x.db"))),
            PathBuf::from("/tmp/x.db")
        );
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matome.json");
        std::fs::write(&path, r#"{"scraper":{"probe_timeout_secs":9}}"#).unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.scraper.probe_timeout_secs, 9);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    }
}
