use crate::api_error::{ApiError, ConfigError, ValidationError};
use crate::api_result::ApiResult;
use crate::config::{default_parallel_tasks, Config, API_BASE_URL, REQUEST_TIMEOUT};
use crate::endpoint::url_build;
use crate::request::{FormRequest, Requester, ORGANIZATION};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// URLS (relative to the base URL):
// Models, list: GET /models
// Models, retrieve: GET /models/{model}
// Models, delete: DELETE /models/{model}
// Completions: POST /completions
// Chat: POST /chat/completions
// Edits: POST /edits
// Embeddings: POST /embeddings
// Moderations: POST /moderations
// Images, create: POST /images/generations
// Images, edit: POST /images/edits
// Images, variations: POST /images/variations
// Audio, transcription: POST /audio/transcriptions
// Audio, translation: POST /audio/translations
// Files, list: GET /files
// Files, upload: POST /files
// Files, delete: DELETE /files/{file_id}
// Files, retrieve: GET /files/{file_id}
// Files, retrieve content: GET /files/{file_id}/content
// Fine tune, create: POST /fine-tunes
// Fine tune, list: GET /fine-tunes
// Fine tune, retrieve: GET /fine-tunes/{fine_tune_id}
// Fine tune, cancel: POST /fine-tunes/{fine_tune_id}/cancel
// Fine tune, events: GET /fine-tunes/{fine_tune_id}/events

/// The client.  Cheap to share by reference across tasks: every call
/// takes `&self`
#[derive(Debug, Clone)]
pub struct ApiInterface {
    /// Handles the communications with the API
    pub(crate) http: reqwest::Client,

    /// The secret key
    pub(crate) api_key: String,

    pub(crate) org_id: Option<String>,

    pub(crate) api_base_url: String,

    /// Limit on simultaneous requests in fan-outs and image saves
    pub(crate) parallel_tasks: usize,

    /// Applied to each request
    pub(crate) timeout: Duration,

    /// Appended to every request
    pub(crate) http_headers: HeaderMap,

    pub(crate) cancellation: CancellationToken,

    /// `Bearer <key>`, ready to send
    pub(crate) auth: HeaderValue,

    /// Not set when there is no organization, or it is empty
    pub(crate) organization: Option<HeaderValue>,
}

impl Display for ApiInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Base URL: {}\n\
             Organization: {}\n\
             Parallel tasks: {}\n\
             Timeout: {:?}",
            self.api_base_url,
            self.org_id.as_deref().unwrap_or("-"),
            self.parallel_tasks,
            self.timeout,
        )
    }
}

impl ApiInterface {
    /// Check `config` and make a client from it
    pub fn new(config: Config) -> Result<Self, ApiError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::NoApiKey.into());
        }
        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| API_BASE_URL.to_string());
        if api_base_url.trim().is_empty() {
            return Err(ConfigError::NoApiBaseUrl.into());
        }
        // Fail now, not on the first request
        url_build::<&str>(&api_base_url, &[])?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ConfigError::InvalidHeader("Authorization"))?;
        auth.set_sensitive(true);
        let organization = match config.org_id.as_deref() {
            Some(org) if !org.is_empty() => Some(
                HeaderValue::from_str(org)
                    .map_err(|_| ConfigError::InvalidHeader(ORGANIZATION))?,
            ),
            _ => None,
        };

        let http = match config.http_client.clone() {
            Some(client) => client,
            None => reqwest::Client::builder()
                .build()
                .map_err(ApiError::Transport)?,
        };
        let parallel_tasks = config
            .parallel_tasks_set()
            .unwrap_or_else(default_parallel_tasks);

        debug!("Client for {api_base_url} with {parallel_tasks} parallel tasks");
        Ok(Self {
            http,
            api_key: config.api_key,
            org_id: config.org_id,
            api_base_url,
            parallel_tasks,
            timeout: config.request_timeout.unwrap_or(REQUEST_TIMEOUT),
            http_headers: config.http_headers,
            cancellation: config.cancellation.unwrap_or_default(),
            auth,
            organization,
        })
    }

    /// A client with everything else defaulted
    pub fn with_key(
        api_key: &str,
        org_id: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, ApiError> {
        let mut config = Config::new(api_key);
        config.org_id = org_id.map(str::to_string);
        config.api_base_url = base_url.map(str::to_string);
        Self::new(config)
    }

    /// Apply `config` on top of the current settings.  What `config`
    /// sets replaces the current value, what it leaves unset is kept.
    /// On error nothing changes
    pub fn reconfigure(&mut self, config: Config) -> Result<(), ApiError> {
        let merged = Config {
            api_key: if config.api_key.is_empty() {
                self.api_key.clone()
            } else {
                config.api_key.clone()
            },
            org_id: config.org_id.clone().or_else(|| self.org_id.clone()),
            api_base_url: config
                .api_base_url
                .clone()
                .or_else(|| Some(self.api_base_url.clone())),
            parallel_tasks: config
                .parallel_tasks_set()
                .or(Some(self.parallel_tasks)),
            request_timeout: config.request_timeout.or(Some(self.timeout)),
            http_headers: if config.http_headers.is_empty() {
                self.http_headers.clone()
            } else {
                config.http_headers
            },
            http_client: config.http_client.or_else(|| Some(self.http.clone())),
            cancellation: config
                .cancellation
                .or_else(|| Some(self.cancellation.clone())),
        };
        *self = Self::new(merged)?;
        Ok(())
    }

    /// The URL for `segments` under the base URL
    pub fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, ApiError> {
        url_build(&self.api_base_url, segments)
    }

    pub fn parallel_tasks(&self) -> usize {
        self.parallel_tasks
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    /// The HTTP client the requests go through
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Cancel this to abort every call in flight
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Helper function: headers as strings.  Values that are not
    /// visible ASCII are dropped
    pub fn header_map_to_hash_map(header_map: &HeaderMap) -> HashMap<String, String> {
        header_map
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect()
    }

    /// GET `segments` and decode the response
    pub(crate) async fn get_json<T, S>(&self, segments: &[S]) -> Result<ApiResult<T>, ApiError>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        self.call_json::<(), T, S>(Method::GET, segments, None).await
    }

    /// Send a request with an optional JSON body and decode the
    /// response
    pub(crate) async fn call_json<B, T, S>(
        &self,
        method: Method,
        segments: &[S],
        body: Option<&B>,
    ) -> Result<ApiResult<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let url = self.endpoint(segments)?;
        let request = self.json_request(method, url, body)?;
        self.execute_json(request).await
    }

    /// Validate `body` then POST it as JSON
    pub(crate) async fn post_json<B, T>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<ApiResult<T>, ApiError>
    where
        B: Requester + Serialize,
        T: DeserializeOwned,
    {
        body.validate()?;
        self.call_json(Method::POST, segments, Some(body)).await
    }

    /// Validate `body` then POST it as a multipart form
    pub(crate) async fn post_form<B, T>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<ApiResult<T>, ApiError>
    where
        B: FormRequest,
        T: DeserializeOwned,
    {
        body.validate()?;
        let url = self.endpoint(segments)?;
        let request = self.multipart_request(Method::POST, url, body).await?;
        self.execute_json(request).await
    }
}

/// A unix timestamp as a UTC date and time
pub fn format_timestamp(seconds: i64) -> String {
    match DateTime::<Utc>::from_timestamp(seconds, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}

/// Read a JSON `null` as the default value.  `#[serde(default)]`
/// only covers a missing key
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Collect a required string into `Ok` or the matching error
pub(crate) fn required(value: &str, err: ValidationError) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(err)
    } else {
        Ok(())
    }
}
