pub mod api_error;
pub mod api_result;
pub mod artifact;
pub mod audio;
pub mod config;
pub mod endpoint;
pub mod fan_out;
pub mod files;
pub mod fine_tune;
pub mod images;
pub mod json;
pub mod model_info;
pub mod openai_interface;
pub mod request;
pub mod transport;

#[cfg(test)]
mod test_server;

pub use api_error::{ApiError, ConfigError, ErrorDetail, ValidationError};
pub use api_result::ApiResult;
pub use config::Config;
pub use openai_interface::ApiInterface;
pub use request::{FormFields, FormRequest, Requester, UploadFile};
