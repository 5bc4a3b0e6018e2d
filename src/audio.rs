//! Speech to text: transcription in the spoken language, and
//! translation into English
use crate::api_error::{ApiError, ValidationError};
use crate::api_result::ApiResult;
use crate::openai_interface::{required, ApiInterface};
use crate::request::{FormFields, FormRequest, Requester, UploadFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One audio file and how to read it.  `language` is only sent for
/// transcriptions
#[derive(Debug, Default)]
pub struct AudioRequest {
    pub file: Option<UploadFile>,
    pub model: String,
    pub prompt: Option<String>,
    pub response_format: Option<String>,
    pub temperature: Option<f32>,
    pub language: Option<String>,
}

impl AudioRequest {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Default::default()
        }
    }

    /// Open `path` as the audio, closing any audio already open
    pub fn open_audio_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ApiError> {
        self.close_audio_file();
        self.file = Some(UploadFile::open(path)?);
        Ok(())
    }

    pub fn close_audio_file(&mut self) {
        if let Some(file) = self.file.as_mut() {
            file.close();
        }
    }

    fn fields(&self, with_language: bool) -> FormFields<'_> {
        let fields = FormFields::new()
            .file("file", self.file.as_ref())
            .text("model", &self.model)
            .opt_text("prompt", self.prompt.as_deref())
            .opt_text("response_format", self.response_format.as_deref())
            .opt_json("temperature", self.temperature.as_ref());
        if with_language {
            fields.opt_text("language", self.language.as_deref())
        } else {
            fields
        }
    }
}

impl Requester for AudioRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.file.is_none() {
            return Err(ValidationError::FileRequired);
        }
        required(&self.model, ValidationError::ModelRequired)
    }

    fn flush(&mut self) {
        self.close_audio_file();
    }
}

impl FormRequest for AudioRequest {
    fn form_fields(&self) -> FormFields<'_> {
        self.fields(true)
    }
}

/// A translation is the same request without the language
struct Translation<'a>(&'a AudioRequest);

impl Requester for Translation<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.0.validate()
    }
}

impl FormRequest for Translation<'_> {
    fn form_fields(&self) -> FormFields<'_> {
        self.0.fields(false)
    }
}

/// The text heard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResponse {
    pub text: String,
}

impl ApiInterface {
    pub async fn audio_transcription(
        &self,
        request: &AudioRequest,
    ) -> Result<ApiResult<AudioResponse>, ApiError> {
        self.post_form(&["audio", "transcriptions"], request).await
    }

    pub async fn audio_translation(
        &self,
        request: &AudioRequest,
    ) -> Result<ApiResult<AudioResponse>, ApiError> {
        self.post_form(&["audio", "translations"], &Translation(request))
            .await
    }
}
