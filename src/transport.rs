//! Send a request and sort out what comes back
use crate::api_error::{ApiError, ErrorResponse};
use crate::api_result::ApiResult;
use crate::openai_interface::ApiInterface;
use log::{debug, warn};
use reqwest::{Request, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Instant;

/// Different endpoints succeed with different codes: 200, 202, 204...
pub fn is_successful(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

pub(crate) fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(err)
    }
}

impl ApiInterface {
    /// Send `request` and return the raw body.  Nothing is decoded on
    /// success.  On failure the server's error payload is decoded, if
    /// it can be, for the message
    pub async fn execute(&self, request: Request) -> Result<ApiResult<Vec<u8>>, ApiError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!("{method} {url}");
        let start = Instant::now();

        let exchange = async {
            let response = self
                .http
                .execute(request)
                .await
                .map_err(transport_error)?;
            let status = response.status();
            let headers = Self::header_map_to_hash_map(response.headers());
            let body = response.bytes().await.map_err(transport_error)?;
            Ok::<_, ApiError>((status, headers, body.to_vec()))
        };

        let (status, headers, body) = tokio::select! {
            _ = self.cancellation.cancelled() => {
                debug!("{method} {url} cancelled after {:?}", start.elapsed());
                return Err(ApiError::Cancelled);
            }
            result = exchange => result?,
        };
        debug!(
            "{method} {url} -> {status} ({} bytes) in {:?}",
            body.len(),
            start.elapsed()
        );

        if !is_successful(status) {
            let detail = serde_json::from_slice::<ErrorResponse>(&body)
                .unwrap_or_default()
                .error;
            warn!("{method} {url} failed: {status} {}", detail.message);
            return Err(ApiError::Status {
                status,
                message: detail.message.clone(),
                detail,
                headers,
            });
        }
        Ok(ApiResult::new(body, headers))
    }

    /// Send `request` and decode the JSON body into `T`
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<ApiResult<T>, ApiError> {
        let raw = self.execute(request).await?;
        let body: T = serde_json::from_slice(&raw.body).map_err(ApiError::Decoding)?;
        Ok(ApiResult::new(body, raw.headers))
    }
}
