//! Client configuration and its defaults
use crate::api_error::{ApiError, ConfigError};
use reqwest::header::HeaderMap;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Base URI for requests
pub const API_BASE_URL: &str = "https://api.openai.com/v1";

/// How long a single request may take
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Twice the number of processors available
pub fn default_parallel_tasks() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// What a client is built from.  Anything left unset takes the
/// default when the client is made.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The secret key
    pub api_key: String,

    /// Sent as `OpenAI-Organization` when set and not empty
    pub org_id: Option<String>,

    /// Where the API lives.  [Default: `API_BASE_URL`]
    pub api_base_url: Option<String>,

    /// Limit on simultaneous requests in a fan-out.  Zero is the same
    /// as unset.  [Default: `default_parallel_tasks()`]
    pub parallel_tasks: Option<usize>,

    /// [Default: `REQUEST_TIMEOUT`]
    pub request_timeout: Option<Duration>,

    /// Added to every request, after the standard headers
    pub http_headers: HeaderMap,

    /// Bring your own transport
    pub http_client: Option<reqwest::Client>,

    /// Cancelling this aborts every call in flight from the client
    pub cancellation: Option<CancellationToken>,
}

impl Config {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    /// Read the configuration from the environment, after loading any
    /// `.env` file.  `OPENAI_API_KEY` is required.  Optional:
    /// `OPENAI_ORG_ID`, `OPENAI_API_BASE_URL`, `OPENAI_PARALLEL_TASKS`
    /// and `OPENAI_REQUEST_TIMEOUT` (seconds)
    pub fn from_env() -> Result<Self, ApiError> {
        dotenv::dotenv().ok();
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| ConfigError::NoApiKey)?;
        let mut config = Config::new(api_key.as_str());
        config.org_id = env::var("OPENAI_ORG_ID").ok();
        config.api_base_url = env::var("OPENAI_API_BASE_URL").ok();
        config.parallel_tasks = env::var("OPENAI_PARALLEL_TASKS")
            .ok()
            .and_then(|v| v.trim().parse().ok());
        config.request_timeout = env::var("OPENAI_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs);
        Ok(config)
    }

    pub fn with_org_id(mut self, org_id: &str) -> Self {
        self.org_id = Some(org_id.to_string());
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.api_base_url = Some(base_url.to_string());
        self
    }

    pub fn with_parallel_tasks(mut self, parallel_tasks: usize) -> Self {
        self.parallel_tasks = Some(parallel_tasks);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.http_headers = headers;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// `parallel_tasks` with zero treated as unset
    pub(crate) fn parallel_tasks_set(&self) -> Option<usize> {
        self.parallel_tasks.filter(|n| *n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parallelism_is_even_and_positive() {
        let n = default_parallel_tasks();
        assert!(n >= 2);
        assert_eq!(n % 2, 0);
    }

    #[test]
    fn zero_parallel_tasks_is_unset() {
        assert_eq!(Config::new("k").with_parallel_tasks(0).parallel_tasks_set(), None);
        assert_eq!(
            Config::new("k").with_parallel_tasks(3).parallel_tasks_set(),
            Some(3)
        );
    }

    #[test]
    fn builder_sets_fields() {
        let config = Config::new("sk-test")
            .with_org_id("org-1")
            .with_base_url("http://localhost:1337/v1")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.org_id.as_deref(), Some("org-1"));
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("http://localhost:1337/v1")
        );
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert!(config.http_client.is_none());
    }
}
