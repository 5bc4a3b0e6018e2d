use crate::api_error::ApiError;
use crate::api_result::ApiResult;
use crate::fan_out::fan_out;
use crate::openai_interface::{format_timestamp, null_as_default, ApiInterface};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPermission {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_create_engine: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_sampling: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_logprobs: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_search_indices: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_view: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_fine_tuning: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub organization: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_blocking: bool,
}

/// One model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDetails {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owned_by: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub permission: Vec<ModelPermission>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub root: String,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Display for ModelDetails {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} (owned by {}, created {})",
            self.id,
            self.owned_by,
            format_timestamp(self.created)
        )
    }
}

/// The body of `GET /models`
#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<ModelDetails>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelDeleteResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    pub deleted: bool,
}

/// The ids of `models`, in order
pub fn model_names(models: &[ModelDetails]) -> Vec<String> {
    models.iter().map(|m| m.id.clone()).collect()
}

impl ApiInterface {
    /// Details of the models named in `ids`, in the same order, or of
    /// every model when `ids` is empty.  The headers are those of the
    /// list call, empty when looking models up one by one
    pub async fn models<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<ApiResult<Vec<ModelDetails>>, ApiError> {
        if ids.is_empty() {
            let list: ApiResult<ModelList> = self.get_json(&["models"]).await?;
            return Ok(list.map(|l| l.data));
        }
        let models = fan_out(ids, self.parallel_tasks, |id| async move {
            let details: ApiResult<ModelDetails> =
                self.get_json(&["models", id.as_ref()]).await?;
            Ok::<_, ApiError>(details.body)
        })
        .await?;
        Ok(ApiResult::new(models, HashMap::new()))
    }

    /// Delete a fine tuned model
    pub async fn model_delete(&self, id: &str) -> Result<ApiResult<ModelDeleteResponse>, ApiError> {
        self.call_json::<(), _, _>(Method::DELETE, &["models", id], None)
            .await
    }
}
