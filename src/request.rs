//! Building outbound requests.  A body is either JSON, or a
//! multipart form that may carry files.
use crate::api_error::{ApiError, ValidationError};
use crate::openai_interface::ApiInterface;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Request, RequestBuilder, Url};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Header carrying the organization identifier
pub const ORGANIZATION: &str = "OpenAI-Organization";

/// What every request object must do
pub trait Requester {
    /// Check the request before anything is sent
    fn validate(&self) -> Result<(), ValidationError>;

    /// Release any files the request holds open.  Safe to call more
    /// than once, and when nothing was ever opened
    fn flush(&mut self) {}
}

/// A request sent as `multipart/form-data`.  The fields are declared,
/// in order, by the request type
pub trait FormRequest: Requester {
    fn form_fields(&self) -> FormFields<'_>;
}

/// A local file to upload.  The handle is owned here and released by
/// `close()` or when this is dropped
#[derive(Debug)]
pub struct UploadFile {
    path: PathBuf,
    handle: Option<File>,
}

impl UploadFile {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let handle = File::open(&path)?;
        Ok(Self {
            path,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The base name, used as the attachment's file name
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }

    /// The whole file, from the start, whatever has been read before
    fn contents(&self) -> io::Result<Vec<u8>> {
        let mut file = match &self.handle {
            Some(handle) => handle.try_clone()?,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} has been closed", self.path.display()),
                ))
            }
        };
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// One value in a form
#[derive(Debug)]
pub enum FieldValue<'a> {
    File(&'a UploadFile),
    Text(String),
}

/// The fields of a form, in the order they were declared.
///
/// `file` takes an optional file and skips it when absent.  `text`
/// writes a string as it is.  `json` writes the JSON encoding of the
/// value, so `true` goes as the text `true` and `4` as `4`.  The
/// `opt_*` variants skip `None`.
#[derive(Debug, Default)]
pub struct FormFields<'a> {
    fields: Vec<(&'static str, FieldValue<'a>)>,
    error: Option<String>,
}

impl<'a> FormFields<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &'static str, file: Option<&'a UploadFile>) -> Self {
        if let Some(file) = file {
            self.fields.push((name, FieldValue::File(file)));
        }
        self
    }

    pub fn text(mut self, name: &'static str, value: &str) -> Self {
        self.fields.push((name, FieldValue::Text(value.to_string())));
        self
    }

    pub fn opt_text(self, name: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.text(name, value),
            None => self,
        }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, name: &'static str, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(encoded) => self.fields.push((name, FieldValue::Text(encoded))),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(format!("field '{name}': {err}"));
                }
            }
        }
        self
    }

    pub fn opt_json<T: Serialize>(self, name: &'static str, value: Option<&T>) -> Self {
        match value {
            Some(value) => self.json(name, value),
            None => self,
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&FieldValue<'a>> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(n, _)| *n).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    /// Encode the fields.  Files are read in full, off the async
    /// threads
    pub async fn into_form(self) -> Result<Form, ApiError> {
        if let Some(err) = self.error {
            return Err(ApiError::MultipartEncoding(err));
        }
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = match value {
                FieldValue::Text(text) => form.text(name, text),
                FieldValue::File(file) => {
                    let file_name = file.file_name();
                    let failed = |err: String| {
                        ApiError::MultipartEncoding(format!("file field '{name}': {err}"))
                    };
                    let handle = file.handle_for_read().map_err(|e| failed(e.to_string()))?;
                    let data = tokio::task::spawn_blocking(move || handle.contents())
                        .await
                        .map_err(|e| failed(e.to_string()))?
                        .map_err(|e| failed(e.to_string()))?;
                    let part = Part::bytes(data)
                        .file_name(file_name)
                        .mime_str("application/octet-stream")
                        .map_err(|e| failed(e.to_string()))?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

impl UploadFile {
    /// A second, owned, `UploadFile` on the same open file, so it can
    /// be read on a blocking thread
    fn handle_for_read(&self) -> io::Result<UploadFile> {
        let handle = match &self.handle {
            Some(handle) => Some(handle.try_clone()?),
            None => None,
        };
        Ok(UploadFile {
            path: self.path.clone(),
            handle,
        })
    }
}

impl ApiInterface {
    /// Authorization, organization and timeout.  Common to all requests
    fn request_builder(&self, method: Method, url: Url) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.auth.clone());
        if let Some(org) = &self.organization {
            headers.insert(ORGANIZATION, org.clone());
        }
        self.http
            .request(method, url)
            .timeout(self.timeout)
            .headers(headers)
    }

    /// The configured extra headers go in last.  They add values, they
    /// never replace any
    fn append_extra_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in self.http_headers.iter() {
            headers.append(name.clone(), value.clone());
        }
    }

    /// A request with an optional JSON body
    pub fn json_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Request, ApiError> {
        let mut builder = self
            .request_builder(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            let buffer = serde_json::to_vec(body).map_err(ApiError::Serialization)?;
            builder = builder.body(buffer);
        }
        let mut request = builder.build().map_err(ApiError::Transport)?;
        self.append_extra_headers(request.headers_mut());
        Ok(request)
    }

    /// A `multipart/form-data` request made from the declared fields
    /// of `body`
    pub async fn multipart_request<R: FormRequest + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &R,
    ) -> Result<Request, ApiError> {
        let form = body.form_fields().into_form().await?;
        let mut request = self
            .request_builder(method, url)
            .multipart(form)
            .build()
            .map_err(ApiError::Transport)?;
        self.append_extra_headers(request.headers_mut());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_server;
    use hyper::{Body, Response};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct Upload {
        file: Option<UploadFile>,
        extra: Option<UploadFile>,
        name: String,
        flag: bool,
        n: u32,
        note: Option<String>,
    }

    impl Requester for Upload {
        fn validate(&self) -> Result<(), ValidationError> {
            match self.file {
                Some(_) => Ok(()),
                None => Err(ValidationError::FileRequired),
            }
        }
        fn flush(&mut self) {
            if let Some(f) = self.file.as_mut() {
                f.close();
            }
            if let Some(f) = self.extra.as_mut() {
                f.close();
            }
        }
    }

    impl FormRequest for Upload {
        fn form_fields(&self) -> FormFields<'_> {
            FormFields::new()
                .file("file", self.file.as_ref())
                .file("extra", self.extra.as_ref())
                .text("name", &self.name)
                .json("flag", &self.flag)
                .json("n", &self.n)
                .opt_text("note", self.note.as_deref())
        }
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("upload")
            .suffix(".jsonl")
            .tempfile()
            .unwrap();
        file.write_all(contents).unwrap();
        file
    }

    fn upload(file: &tempfile::NamedTempFile) -> Upload {
        Upload {
            file: Some(UploadFile::open(file.path()).unwrap()),
            extra: None,
            name: "plain text".to_string(),
            flag: true,
            n: 4,
            note: None,
        }
    }

    fn client(base: &str) -> ApiInterface {
        ApiInterface::new(Config::new("sk-test").with_base_url(base)).unwrap()
    }

    #[test]
    fn fields_keep_declaration_order_and_skip_absent() {
        let file = temp_file(b"{}");
        let request = upload(&file);
        let fields = request.form_fields();
        assert_eq!(fields.names(), vec!["file", "name", "flag", "n"]);
        match fields.get("flag") {
            Some(FieldValue::Text(t)) => assert_eq!(t, "true"),
            other => panic!("{other:?}"),
        }
        match fields.get("n") {
            Some(FieldValue::Text(t)) => assert_eq!(t, "4"),
            other => panic!("{other:?}"),
        }
        match fields.get("name") {
            Some(FieldValue::Text(t)) => assert_eq!(t, "plain text"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn json_fields_encode_structures() {
        let fields = FormFields::new()
            .json("betas", &[0.5, 1.0])
            .opt_json("missing", None::<&u32>)
            .json("nested", &serde_json::json!({"a": 1}));
        assert_eq!(fields.len(), 2);
        match fields.get("betas") {
            Some(FieldValue::Text(t)) => assert_eq!(t, "[0.5,1.0]"),
            other => panic!("{other:?}"),
        }
        match fields.get("nested") {
            Some(FieldValue::Text(t)) => assert_eq!(t, r#"{"a":1}"#),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn flush_twice_without_files_is_fine() {
        let mut request = Upload {
            file: None,
            extra: None,
            name: String::new(),
            flag: false,
            n: 0,
            note: None,
        };
        request.flush();
        request.flush();
        assert_eq!(request.validate(), Err(ValidationError::FileRequired));
    }

    #[test]
    fn close_is_idempotent() {
        let file = temp_file(b"abc");
        let mut upload = UploadFile::open(file.path()).unwrap();
        assert!(upload.is_open());
        upload.close();
        upload.close();
        assert!(!upload.is_open());
        assert!(upload.file_name().starts_with("upload"));
    }

    #[test]
    fn json_request_headers() {
        let mut extra = HeaderMap::new();
        extra.append("x-trace", HeaderValue::from_static("one"));
        extra.append("x-trace", HeaderValue::from_static("two"));
        let api = ApiInterface::new(
            Config::new("sk-test")
                .with_org_id("org-42")
                .with_base_url("http://localhost/v1")
                .with_headers(extra),
        )
        .unwrap();
        let url = api.endpoint(&["completions"]).unwrap();
        let request = api
            .json_request(Method::POST, url, Some(&serde_json::json!({"model": "m"})))
            .unwrap();
        let headers = request.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[ORGANIZATION], "org-42");
        assert_eq!(headers.get_all("x-trace").iter().count(), 2);
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"model":"m"}"#);
    }

    #[test]
    fn json_request_without_body_or_org() {
        let api = client("http://localhost/v1");
        let url = api.endpoint(&["models"]).unwrap();
        let request = api.json_request::<()>(Method::GET, url, None).unwrap();
        assert!(request.body().is_none());
        assert!(request.headers().get(ORGANIZATION).is_none());
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn empty_org_id_sends_no_header() {
        let api = ApiInterface::new(
            Config::new("sk-test")
                .with_org_id("")
                .with_base_url("http://localhost/v1"),
        )
        .unwrap();
        let url = api.endpoint(&["models"]).unwrap();
        let request = api.json_request::<()>(Method::GET, url, None).unwrap();
        assert!(request.headers().get(ORGANIZATION).is_none());
    }

    #[tokio::test]
    async fn multipart_body_has_one_file_part() {
        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_org: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let org_sink = seen_org.clone();
        let addr = test_server::serve(move |req| {
            let sink = sink.clone();
            let org_sink = org_sink.clone();
            async move {
                *org_sink.lock().unwrap() = req
                    .headers()
                    .get(ORGANIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = hyper::body::to_bytes(req.into_body()).await.unwrap();
                sink.lock().unwrap().extend_from_slice(&bytes);
                Response::new(Body::from("{}"))
            }
        })
        .await;

        let file = temp_file(b"{\"prompt\":\"p\"}\n");
        let request = upload(&file);
        let mut extra = HeaderMap::new();
        extra.append("x-trace", HeaderValue::from_static("one"));
        extra.append("x-trace", HeaderValue::from_static("two"));
        let api = ApiInterface::new(
            Config::new("sk-test")
                .with_org_id("org-42")
                .with_base_url(&format!("http://{addr}/v1"))
                .with_headers(extra),
        )
        .unwrap();
        let url = api.endpoint(&["files"]).unwrap();
        let outbound = api
            .multipart_request(Method::POST, url, &request)
            .await
            .unwrap();
        let content_type = outbound.headers()[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert_eq!(outbound.headers()[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(outbound.headers()[ORGANIZATION], "org-42");
        let traces: Vec<&str> = outbound
            .headers()
            .get_all("x-trace")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(traces, vec!["one", "two"]);
        api.execute(outbound).await.unwrap();
        assert_eq!(seen_org.lock().unwrap().as_deref(), Some("org-42"));

        let body = String::from_utf8(seen.lock().unwrap().clone()).unwrap();
        assert_eq!(body.matches("filename=").count(), 1);
        assert!(body.contains(&format!("filename=\"{}\"", request.file.as_ref().unwrap().file_name())));
        assert!(body.contains("{\"prompt\":\"p\"}"));
        assert!(body.contains("name=\"flag\"\r\n\r\ntrue\r\n"));
        assert!(body.contains("name=\"name\"\r\n\r\nplain text\r\n"));
        assert!(!body.contains("name=\"extra\""));
    }

    #[tokio::test]
    async fn file_is_sent_whole_every_time() {
        let file = temp_file(b"0123456789");
        let request = upload(&file);
        for _ in 0..2 {
            let fields = request.form_fields();
            let reader = match fields.get("file") {
                Some(FieldValue::File(f)) => f.handle_for_read().unwrap(),
                other => panic!("{other:?}"),
            };
            assert_eq!(reader.contents().unwrap(), b"0123456789");
        }
    }

    #[tokio::test]
    async fn closed_file_fails_encoding() {
        let file = temp_file(b"data");
        let mut request = upload(&file);
        request.flush();
        let api = client("http://localhost/v1");
        let url = api.endpoint(&["files"]).unwrap();
        match api.multipart_request(Method::POST, url, &request).await {
            Err(ApiError::MultipartEncoding(msg)) => assert!(msg.contains("'file'")),
            other => panic!("{other:?}"),
        }
    }
}
