use crate::api_error::{ApiError, ValidationError};
use crate::api_result::ApiResult;
use crate::fan_out::fan_out;
use crate::openai_interface::{format_timestamp, null_as_default, required, ApiInterface};
use crate::request::{FormFields, FormRequest, Requester, UploadFile};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// A file stored with the API.  Uploads return the same shape
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDetails {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bytes: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub purpose: String,
}

pub type FileUploadResponse = FileDetails;

impl Display for FileDetails {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} Size: {} Name: {} Purpose: {} Created: {}",
            self.id,
            self.bytes,
            self.filename,
            self.purpose,
            format_timestamp(self.created_at)
        )
    }
}

/// The file names of `files`, in order
pub fn file_names(files: &[FileDetails]) -> Vec<String> {
    files.iter().map(|f| f.filename.clone()).collect()
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<FileDetails>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FileDeleteResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    pub deleted: bool,
}

/// Upload a JSON Lines file, for fine tuning for instance
#[derive(Debug, Default)]
pub struct FileUploadRequest {
    pub file: Option<UploadFile>,
    pub purpose: String,
}

impl FileUploadRequest {
    pub fn new(purpose: &str) -> Self {
        Self {
            file: None,
            purpose: purpose.to_string(),
        }
    }

    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ApiError> {
        self.close_file();
        self.file = Some(UploadFile::open(path)?);
        Ok(())
    }

    pub fn close_file(&mut self) {
        if let Some(file) = self.file.as_mut() {
            file.close();
        }
    }
}

impl Requester for FileUploadRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.file.is_none() {
            return Err(ValidationError::FileRequired);
        }
        required(&self.purpose, ValidationError::PurposeRequired)
    }

    fn flush(&mut self) {
        self.close_file();
    }
}

impl FormRequest for FileUploadRequest {
    fn form_fields(&self) -> FormFields<'_> {
        FormFields::new()
            .file("file", self.file.as_ref())
            .text("purpose", &self.purpose)
    }
}

impl ApiInterface {
    /// The files named by `ids`, in order, or all files when `ids` is
    /// empty
    pub async fn files<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<ApiResult<Vec<FileDetails>>, ApiError> {
        if ids.is_empty() {
            let list: ApiResult<FileList> = self.get_json(&["files"]).await?;
            return Ok(list.map(|l| l.data));
        }
        let files = fan_out(ids, self.parallel_tasks, |id| async move {
            let details: ApiResult<FileDetails> = self.get_json(&["files", id.as_ref()]).await?;
            Ok::<_, ApiError>(details.body)
        })
        .await?;
        Ok(ApiResult::new(files, HashMap::new()))
    }

    pub async fn file_delete(&self, id: &str) -> Result<ApiResult<FileDeleteResponse>, ApiError> {
        self.call_json::<(), _, _>(Method::DELETE, &["files", id], None)
            .await
    }

    pub async fn file_upload(
        &self,
        request: &FileUploadRequest,
    ) -> Result<ApiResult<FileUploadResponse>, ApiError> {
        self.post_form(&["files"], request).await
    }

    /// The contents of a file, as text.  Not decoded
    pub async fn file_content(&self, id: &str) -> Result<ApiResult<String>, ApiError> {
        let url = self.endpoint(&["files", id, "content"])?;
        let request = self.json_request::<()>(Method::GET, url, None)?;
        let raw = self.execute(request).await?;
        let text = raw.text();
        Ok(ApiResult::new(text, raw.headers))
    }
}
