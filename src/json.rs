//! The structures for the JSON text endpoints: completions, chat,
//! edits, embeddings and moderations
use crate::api_error::{ApiError, ValidationError};
use crate::api_result::ApiResult;
use crate::openai_interface::{null_as_default, required, ApiInterface};
use crate::request::Requester;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The roles a chat message may have
pub const CHAT_ROLES: [&str; 3] = ["system", "user", "assistant"];

/// A prompt, a stop sequence or an input: one string or several
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TextInput {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for TextInput {
    fn from(s: &str) -> Self {
        TextInput::One(s.to_string())
    }
}

impl From<Vec<String>> for TextInput {
    fn from(v: Vec<String>) -> Self {
        TextInput::Many(v)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u32,
}

/// Trimmed texts, one per line
fn join_trimmed<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts.map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Request for a completion.  See
/// https://platform.openai.com/docs/api-reference/completions/create
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<TextInput>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<TextInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_of: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: &str, model: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: Some(prompt.into()),
            model: model.to_string(),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }
}

impl Requester for CompletionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.model, ValidationError::ModelRequired)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response for a completions request
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Choice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

impl CompletionResponse {
    /// Each choice trimmed, one per line
    pub fn text(&self) -> String {
        join_trimmed(self.choices.iter().map(|c| c.text.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            name: None,
        }
    }
}

/// Request for a chat completion.  See
/// https://platform.openai.com/docs/api-reference/chat/create
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f32>>,
}

impl Requester for ChatCompletionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.model, ValidationError::ModelRequired)?;
        if self.messages.is_empty() {
            return Err(ValidationError::MessageRequired);
        }
        for message in self.messages.iter() {
            if !CHAT_ROLES.contains(&message.role.as_str()) {
                return Err(ValidationError::InvalidRole);
            }
            required(&message.content, ValidationError::PromptRequired)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatChoice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn text(&self) -> String {
        join_trimmed(self.choices.iter().map(|c| c.message.content.as_str()))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EditRequest {
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl Requester for EditRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.model, ValidationError::ModelRequired)?;
        required(&self.instruction, ValidationError::InstructionRequired)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditChoice {
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<EditChoice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

impl EditResponse {
    pub fn text(&self) -> String {
        join_trimmed(self.choices.iter().map(|c| c.text.as_str()))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Option<TextInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Requester for EmbeddingRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.model, ValidationError::ModelRequired)?;
        match self.input {
            Some(_) => Ok(()),
            None => Err(ValidationError::InputRequired),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedding {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    pub embedding: Vec<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Embedding>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModerationRequest {
    pub input: String,
    pub model: String,
}

impl Requester for ModerationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.input, ValidationError::InputRequired)?;
        required(&self.model, ValidationError::ModelRequired)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: HashMap<String, bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_scores: HashMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flagged: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<ModerationResult>,
}

impl ModerationResponse {
    /// Flagged under any category by any result
    pub fn is_flagged(&self) -> bool {
        self.results.iter().any(|r| r.flagged)
    }
}

impl ApiInterface {
    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ApiResult<CompletionResponse>, ApiError> {
        self.post_json(&["completions"], request).await
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ApiResult<ChatCompletionResponse>, ApiError> {
        self.post_json(&["chat", "completions"], request).await
    }

    pub async fn edit(&self, request: &EditRequest) -> Result<ApiResult<EditResponse>, ApiError> {
        self.post_json(&["edits"], request).await
    }

    pub async fn embedding(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<ApiResult<EmbeddingResponse>, ApiError> {
        self.post_json(&["embeddings"], request).await
    }

    pub async fn moderation(
        &self,
        request: &ModerationRequest,
    ) -> Result<ApiResult<ModerationResponse>, ApiError> {
        self.post_json(&["moderations"], request).await
    }
}
