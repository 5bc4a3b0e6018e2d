use std::collections::HashMap;

/// A response body, of whatever type, with the headers the server
/// sent along with it
#[derive(Debug)]
pub struct ApiResult<T> {
    pub headers: HashMap<String, String>,
    pub body: T,
}

impl<T> ApiResult<T> {
    pub fn new(body: T, headers: HashMap<String, String>) -> Self {
        Self { headers, body }
    }

    /// Change the body, keep the headers
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        ApiResult {
            headers: self.headers,
            body: f(self.body),
        }
    }
}

impl ApiResult<Vec<u8>> {
    /// The raw body as text.  Invalid UTF-8 is replaced, not an error
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
