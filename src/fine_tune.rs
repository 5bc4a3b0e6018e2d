use crate::api_error::{ApiError, ValidationError};
use crate::api_result::ApiResult;
use crate::fan_out::fan_out;
use crate::files::FileDetails;
use crate::openai_interface::{format_timestamp, null_as_default, ApiInterface};
use crate::request::Requester;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Start a fine tune.  See
/// https://platform.openai.com/docs/api-reference/fine-tunes/create
#[derive(Debug, Clone, Default, Serialize)]
pub struct FineTuneRequest {
    /// ID of an uploaded file of training data
    pub training_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_file: Option<String>,
    /// The base model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_loss_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_classification_metrics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_n_classes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_positive_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_betas: Option<Vec<f64>>,
    /// Added to the fine tuned model's name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl FineTuneRequest {
    pub fn new(training_file: &str) -> Self {
        Self {
            training_file: training_file.to_string(),
            ..Default::default()
        }
    }
}

/// The server checks these itself
impl Requester for FineTuneRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Hyperparams {
    #[serde(default, deserialize_with = "null_as_default")]
    pub n_epochs: u32,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_loss_weight: f64,
    #[serde(default)]
    pub learning_rate_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FineTuneEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    pub created_at: i64,
    pub level: String,
    pub message: String,
}

impl Display for FineTuneEvent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            format_timestamp(self.created_at),
            self.level,
            self.message
        )
    }
}

/// A fine tune job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FineTune {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<FineTuneEvent>,
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hyperparams: Hyperparams,
    #[serde(default, deserialize_with = "null_as_default")]
    pub organization_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result_files: Vec<FileDetails>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub validation_files: Vec<FileDetails>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub training_files: Vec<FileDetails>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: i64,
}

impl Display for FineTune {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(
            f,
            "Fine Tuned Model: {}",
            self.fine_tuned_model.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "Created: {}", format_timestamp(self.created_at))?;
        writeln!(f, "Updated: {}", format_timestamp(self.updated_at))?;

        writeln!(f, "Hyperparameters:")?;
        writeln!(f, "  N Epochs: {}", self.hyperparams.n_epochs)?;
        if let Some(batch_size) = self.hyperparams.batch_size {
            writeln!(f, "  Batch Size: {batch_size}")?;
        }
        writeln!(
            f,
            "  Prompt Loss Weight: {}",
            self.hyperparams.prompt_loss_weight
        )?;
        if let Some(multiplier) = self.hyperparams.learning_rate_multiplier {
            writeln!(f, "  Learning Rate Multiplier: {multiplier}")?;
        }

        for (title, files) in [
            ("Training Files", &self.training_files),
            ("Validation Files", &self.validation_files),
            ("Result Files", &self.result_files),
        ] {
            if !files.is_empty() {
                writeln!(f, "{title}:")?;
                for file in files.iter() {
                    writeln!(f, "  {} {}", file.id, file.filename)?;
                }
            }
        }

        if !self.events.is_empty() {
            writeln!(f, "Events:")?;
            for event in self.events.iter() {
                writeln!(f, "  {event}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FineTuneList {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<FineTune>,
}

#[derive(Debug, Deserialize)]
struct FineTuneEventList {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<FineTuneEvent>,
}

impl ApiInterface {
    /// Start fine tuning
    pub async fn fine_tune(&self, request: &FineTuneRequest) -> Result<ApiResult<FineTune>, ApiError> {
        self.post_json(&["fine-tunes"], request).await
    }

    /// The fine tunes named by `ids`, in order, or all of them when
    /// `ids` is empty
    pub async fn fine_tunes<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<ApiResult<Vec<FineTune>>, ApiError> {
        if ids.is_empty() {
            let list: ApiResult<FineTuneList> = self.get_json(&["fine-tunes"]).await?;
            return Ok(list.map(|l| l.data));
        }
        let fine_tunes = fan_out(ids, self.parallel_tasks, |id| async move {
            let job: ApiResult<FineTune> = self.get_json(&["fine-tunes", id.as_ref()]).await?;
            Ok::<_, ApiError>(job.body)
        })
        .await?;
        Ok(ApiResult::new(fine_tunes, HashMap::new()))
    }

    pub async fn fine_tune_cancel(&self, id: &str) -> Result<ApiResult<FineTune>, ApiError> {
        self.call_json::<(), _, _>(Method::POST, &["fine-tunes", id, "cancel"], None)
            .await
    }

    pub async fn fine_tune_events(
        &self,
        id: &str,
    ) -> Result<ApiResult<Vec<FineTuneEvent>>, ApiError> {
        let list: ApiResult<FineTuneEventList> =
            self.get_json(&["fine-tunes", id, "events"]).await?;
        Ok(list.map(|l| l.data))
    }
}
