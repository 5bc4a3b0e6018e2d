//! Image generation, edits and variations
use crate::api_error::{ApiError, ValidationError};
use crate::api_result::ApiResult;
use crate::artifact::{save_images, Download};
pub use crate::artifact::ImageData;
use crate::openai_interface::{format_timestamp, null_as_default, required, ApiInterface};
use crate::request::{FormFields, FormRequest, Requester, UploadFile};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

pub const IMAGE_SIZES: [&str; 3] = ["256x256", "512x512", "1024x1024"];
pub const IMAGE_RESPONSE_FORMATS: [&str; 2] = ["url", "b64_json"];

/// Size and format are optional, but must be known values when given
fn check_size_and_format(
    size: Option<&str>,
    response_format: Option<&str>,
) -> Result<(), ValidationError> {
    if let Some(format) = response_format {
        if !IMAGE_RESPONSE_FORMATS.contains(&format) {
            return Err(ValidationError::InvalidResponseFormat);
        }
    }
    if let Some(size) = size {
        if !IMAGE_SIZES.contains(&size) {
            return Err(ValidationError::InvalidSize);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Requester for ImageGenerationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.prompt, ValidationError::PromptRequired)?;
        check_size_and_format(self.size.as_deref(), self.response_format.as_deref())
    }
}

/// Edit an image, guided by a prompt and optionally a mask
#[derive(Debug, Default)]
pub struct ImageEditRequest {
    pub image: Option<UploadFile>,
    pub mask: Option<UploadFile>,
    pub prompt: String,
    pub n: Option<u32>,
    pub size: Option<String>,
    pub response_format: Option<String>,
    pub user: Option<String>,
}

impl ImageEditRequest {
    /// Open `path` as the image, closing any image already open
    pub fn open_image_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ApiError> {
        self.close_image_file();
        self.image = Some(UploadFile::open(path)?);
        Ok(())
    }

    pub fn open_mask_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ApiError> {
        self.close_mask_file();
        self.mask = Some(UploadFile::open(path)?);
        Ok(())
    }

    pub fn close_image_file(&mut self) {
        if let Some(image) = self.image.as_mut() {
            image.close();
        }
    }

    pub fn close_mask_file(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            mask.close();
        }
    }
}

impl Requester for ImageEditRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.image.is_none() {
            return Err(ValidationError::ImageRequired);
        }
        required(&self.prompt, ValidationError::PromptRequired)?;
        check_size_and_format(self.size.as_deref(), self.response_format.as_deref())
    }

    fn flush(&mut self) {
        self.close_image_file();
        self.close_mask_file();
    }
}

impl FormRequest for ImageEditRequest {
    fn form_fields(&self) -> FormFields<'_> {
        FormFields::new()
            .file("image", self.image.as_ref())
            .file("mask", self.mask.as_ref())
            .text("prompt", &self.prompt)
            .opt_json("n", self.n.as_ref())
            .opt_text("size", self.size.as_deref())
            .opt_text("response_format", self.response_format.as_deref())
            .opt_text("user", self.user.as_deref())
    }
}

/// Variations on an image
#[derive(Debug, Default)]
pub struct ImageVariationRequest {
    pub image: Option<UploadFile>,
    pub n: Option<u32>,
    pub size: Option<String>,
    pub response_format: Option<String>,
    pub user: Option<String>,
}

impl ImageVariationRequest {
    pub fn open_image_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ApiError> {
        self.close_image_file();
        self.image = Some(UploadFile::open(path)?);
        Ok(())
    }

    pub fn close_image_file(&mut self) {
        if let Some(image) = self.image.as_mut() {
            image.close();
        }
    }
}

impl Requester for ImageVariationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.image.is_none() {
            return Err(ValidationError::ImageRequired);
        }
        check_size_and_format(self.size.as_deref(), self.response_format.as_deref())
    }

    fn flush(&mut self) {
        self.close_image_file();
    }
}

impl FormRequest for ImageVariationRequest {
    fn form_fields(&self) -> FormFields<'_> {
        FormFields::new()
            .file("image", self.image.as_ref())
            .opt_json("n", self.n.as_ref())
            .opt_text("size", self.size.as_deref())
            .opt_text("response_format", self.response_format.as_deref())
            .opt_text("user", self.user.as_deref())
    }
}

/// What all three image endpoints return
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<ImageData>,
}

impl ImageResponse {
    /// Write the images under `destination`: a directory, or a file
    /// name to number the images from
    pub async fn save<P: AsRef<Path>>(
        &self,
        api: &ApiInterface,
        destination: P,
    ) -> Result<(), ApiError> {
        let download = Download {
            http: api.http(),
            timeout: api.timeout(),
            cancellation: api.cancellation_token(),
        };
        save_images(
            download,
            destination.as_ref(),
            api.parallel_tasks(),
            &self.data,
        )
        .await
    }
}

impl Display for ImageResponse {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "Created: {}", format_timestamp(self.created))?;
        for image in self.data.iter() {
            if image.url.is_empty() {
                writeln!(f, "  <{} bytes of base64>", image.b64_json.len())?;
            } else {
                writeln!(f, "  {}", image.url)?;
            }
        }
        Ok(())
    }
}

impl ApiInterface {
    pub async fn image_generation(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ApiResult<ImageResponse>, ApiError> {
        self.post_json(&["images", "generations"], request).await
    }

    pub async fn image_edit(
        &self,
        request: &ImageEditRequest,
    ) -> Result<ApiResult<ImageResponse>, ApiError> {
        self.post_form(&["images", "edits"], request).await
    }

    pub async fn image_variation(
        &self,
        request: &ImageVariationRequest,
    ) -> Result<ApiResult<ImageResponse>, ApiError> {
        self.post_form(&["images", "variations"], request).await
    }
}
