use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

use crate::auth::Credentials;
use crate::commands::comments::FetchStrategy;
use crate::error::{ExportError, Result};

/// Upper bound on network operations in flight during comment fetching.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

#[derive(Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub subdomain: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub session_timeout_secs: Option<u64>,
    pub strategy: Option<FetchStrategy>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).map_err(|e| ExportError::ConfigRead {
                path: config_path.clone(),
                source: e,
            })?;

        Self::parse(&contents).map_err(|e| ExportError::ConfigParse {
            path: config_path,
            source: e,
        })
    }

    fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "helpdesk-export").ok_or(ExportError::NoConfigDir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory holding the identity cache artifacts.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        Self::project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// Resolve the helpdesk base URL. Env vars take precedence over the file,
    /// and an explicit URL wins over a subdomain.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if let Ok(url) = std::env::var("HELPDESK_BASE_URL") {
            url
        } else if let Ok(sub) = std::env::var("HELPDESK_SUBDOMAIN") {
            subdomain_url(&sub)
        } else if let Some(url) = &self.base_url {
            url.clone()
        } else if let Some(sub) = &self.subdomain {
            subdomain_url(sub)
        } else {
            return Err(ExportError::MissingBaseUrl);
        };

        let url = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| ExportError::InvalidUrl(format!("{raw}: {e}")))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ExportError::InvalidUrl(raw));
        }
        Ok(url)
    }

    /// Get credentials with env vars taking precedence over config file
    pub fn credentials(&self) -> Result<Credentials> {
        let email = std::env::var("HELPDESK_EMAIL")
            .ok()
            .or_else(|| self.email.clone());
        let api_token = std::env::var("HELPDESK_API_TOKEN")
            .ok()
            .or_else(|| self.api_token.clone());

        match (email, api_token) {
            (Some(email), Some(api_token)) if !email.is_empty() && !api_token.is_empty() => {
                Ok(Credentials::new(email, api_token))
            }
            _ => Err(ExportError::MissingCredentials),
        }
    }

    /// Get output directory, preferring explicit argument over config
    pub fn resolve_output_dir(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn resolve_strategy(&self, explicit: Option<FetchStrategy>) -> FetchStrategy {
        explicit.or(self.strategy).unwrap_or_default()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(
            self.session_timeout_secs
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS),
        )
    }
}

fn subdomain_url(subdomain: &str) -> String {
    format!("https://{subdomain}.zendesk.com")
}
