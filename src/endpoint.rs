//! Join a base URL and path segments into an endpoint URL
use crate::api_error::ApiError;
use reqwest::Url;

/// Build `base` + `segments` into an absolute URL.
///
/// The path of `base` and every segment are split on `/` and put back
/// together, so it does not matter if a segment starts or ends with a
/// separator: `("https://host/v1/", ["/models/", "x"])` gives
/// `https://host/v1/models/x`.  `.` components are dropped and `..`
/// removes the previous one.  The query string of `base` is kept.
pub fn url_build<S: AsRef<str>>(base: &str, segments: &[S]) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("cannot be a base".to_string()));
    }

    let mut components: Vec<&str> = Vec::new();
    let base_path = url.path().to_string();
    for part in std::iter::once(base_path.as_str())
        .chain(segments.iter().map(|s| s.as_ref()))
        .flat_map(|s| s.split('/'))
    {
        match part {
            "" | "." => (),
            ".." => {
                components.pop();
            }
            p => components.push(p),
        }
    }
    url.set_path(&format!("/{}", components.join("/")));
    Ok(url)
}
