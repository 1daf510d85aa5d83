//! Typed settings loaded from a YAML file.
//!
//! The file path defaults to `quarry.yml` in the working directory and can
//! be overridden with `QUARRY_CONFIG`. Every field carries a default so a
//! missing file yields a usable (if crawl-less) configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::core::errors::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawl: CrawlSettings,
    pub storage: StorageSettings,
    pub retrieval: RetrievalSettings,
    pub backend: BackendSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Ordered crawl entry points.
    pub seed_urls: Vec<String>,
    /// Hosts (and their subdomains) the crawl may touch. Empty means any.
    pub allowed_domains: Vec<String>,
    /// Regexes matched against the full URL; a match drops the link.
    pub deny_patterns: Vec<String>,
    /// Documents buffered between checkpoint flushes.
    pub checkpoint_interval: usize,
    /// Size of the fetch worker pool.
    pub concurrency: usize,
    /// Shared probe+fetch request budget.
    pub requests_per_second: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            seed_urls: Vec::new(),
            allowed_domains: Vec::new(),
            deny_patterns: Vec::new(),
            checkpoint_interval: 500,
            concurrency: 8,
            requests_per_second: 4,
            timeout_secs: 30,
            user_agent: concat!("quarry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CrawlSettings {
    pub fn deny_regexes(&self) -> Result<Vec<Regex>, AppError> {
        self.deny_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    AppError::BadRequest(format!("invalid deny pattern '{}': {}", pattern, err))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite file holding the checkpointed documents and the corpus tables.
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/quarry.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base address of the model worker serving generation and embeddings.
    pub worker_addr: String,
    pub supported_models: Vec<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            worker_addr: "http://localhost:8081".to_string(),
            supported_models: vec!["vicuna-13b-v1.5".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        env::var("QUARRY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("quarry.yml"))
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path).map_err(AppError::internal)?;
            serde_yaml::from_str(&contents).map_err(|err| {
                AppError::BadRequest(format!("invalid config {}: {}", path.display(), err))
            })?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.crawl.checkpoint_interval == 0 {
            return Err(AppError::BadRequest(
                "crawl.checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.crawl.concurrency == 0 {
            return Err(AppError::BadRequest(
                "crawl.concurrency must be at least 1".to_string(),
            ));
        }
        if self.crawl.requests_per_second == 0 {
            return Err(AppError::BadRequest(
                "crawl.requests_per_second must be at least 1".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::BadRequest(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }

        // Compile deny patterns now so a bad regex fails at startup, not
        // mid-crawl.
        self.crawl.deny_regexes()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/quarry.yml")).unwrap();
        assert_eq!(settings.crawl.checkpoint_interval, 500);
        assert_eq!(settings.retrieval.top_k, 5);
        assert!(settings.crawl.seed_urls.is_empty());
    }

    #[test]
    fn partial_yaml_overrides_defaults() {
        let file = write_config(
            "crawl:\n  seed_urls: [\"https://helpdesk.example.org\"]\n  checkpoint_interval: 10\nretrieval:\n  top_k: 3\n",
        );
        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.crawl.seed_urls.len(), 1);
        assert_eq!(settings.crawl.checkpoint_interval, 10);
        assert_eq!(settings.retrieval.top_k, 3);
        // untouched sections keep their defaults
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn zero_interval_rejected() {
        let file = write_config("crawl:\n  checkpoint_interval: 0\n");
        let result = Settings::load_from(file.path());
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn invalid_deny_pattern_rejected() {
        let file = write_config("crawl:\n  deny_patterns: [\"([unclosed\"]\n");
        let result = Settings::load_from(file.path());
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
