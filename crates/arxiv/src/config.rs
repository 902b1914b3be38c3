use crate::error::ArxivError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_PAPER_DIR: &str = "papers";

#[derive(Debug, Clone, PartialEq)]
pub struct ArxivConfig {
    pub api_url: String,
    pub paper_dir: PathBuf,
    pub request_timeout: Duration,
}

impl ArxivConfig {
    /// `ARXIV_API_URL` and `PAPER_DIR` with their defaults
    pub fn from_env() -> Result<Self, ArxivError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ArxivError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("ARXIV_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Url::parse(&api_url)
            .map_err(|e| ArxivError::Config(format!("invalid ARXIV_API_URL '{}': {}", api_url, e)))?;

        let paper_dir = lookup("PAPER_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAPER_DIR.to_string());

        Ok(Self {
            api_url,
            paper_dir: PathBuf::from(paper_dir),
            request_timeout: Duration::from_secs(30),
        })
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            paper_dir: PathBuf::from(DEFAULT_PAPER_DIR),
            request_timeout: Duration::from_secs(30),
        }
    }
}
