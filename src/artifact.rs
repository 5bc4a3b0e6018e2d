//! Save generated images to local files
use crate::api_error::ApiError;
use crate::openai_interface::null_as_default;
use crate::transport::transport_error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use directories::BaseDirs;
use futures::future::join_all;
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// The extension given to saved images
pub const IMAGE_EXTENSION: &str = "png";

/// One generated image.  The server fills in `url` or `b64_json`
/// depending on the response format asked for, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageData {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub url: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub b64_json: String,
}

/// Where an image's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Url,
    Base64,
}

/// How images given by URL are fetched: the client's HTTP client,
/// request timeout and cancellation token
#[derive(Debug, Clone, Copy)]
pub struct Download<'a> {
    pub http: &'a reqwest::Client,
    pub timeout: Duration,
    pub cancellation: &'a CancellationToken,
}

/// A random name: 16 random bytes as hex
pub fn unique_file_name() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Work out the file for item `index` of `count` being saved to
/// `destination`.
///
/// `~/` is the home directory and relative paths are relative to the
/// current directory.  A directory gets a new random file name in it.
/// Anything else is a file name, whether or not it exists yet: it gets
/// `.png` if it has no extension, and when there is more than one item,
/// items after the first get `_<index>` on the stem.  So `out` that is
/// not there becomes `out.png` rather than an error.
pub fn to_image_path(index: usize, count: usize, destination: &Path) -> Result<PathBuf, ApiError> {
    let text = destination.to_string_lossy();
    let mut path = match text.strip_prefix("~/") {
        Some(rest) => match BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => {
                return Err(ApiError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no home directory",
                )))
            }
        },
        None => destination.to_path_buf(),
    };
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }

    let names_dir = text.ends_with('/') || text.ends_with(MAIN_SEPARATOR);
    if names_dir || path.is_dir() {
        if !path.is_dir() {
            return Err(ApiError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            )));
        }
        return Ok(path.join(format!("{}.{IMAGE_EXTENSION}", unique_file_name())));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| IMAGE_EXTENSION.to_string());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = if count > 1 && index > 0 {
        format!("{stem}_{index}.{extension}")
    } else {
        format!("{stem}.{extension}")
    };
    Ok(path.with_file_name(file_name))
}

/// Save every image in `images` under `destination`, at most `limit`
/// at a time.
///
/// The first image decides how all of them are read: if it has a URL
/// they are all downloaded, if it has base64 data they are all decoded.
/// All are attempted.  The first error to happen is returned.
pub async fn save_images(
    download: Download<'_>,
    destination: &Path,
    limit: usize,
    images: &[ImageData],
) -> Result<(), ApiError> {
    let source = match images.first() {
        None => return Ok(()),
        Some(first) if !first.url.is_empty() => Source::Url,
        Some(first) if !first.b64_json.is_empty() => Source::Base64,
        Some(_) => return Ok(()),
    };

    let count = images.len();
    let semaphore = Semaphore::new(limit.max(1));
    let errors: Mutex<Vec<ApiError>> = Mutex::new(Vec::new());
    let (semaphore, errors) = (&semaphore, &errors);

    join_all(images.iter().enumerate().map(|(index, image)| async move {
        let _permit = semaphore.acquire().await.ok();
        if let Err(err) = save_one(download, destination, index, count, source, image).await {
            if let Ok(mut errors) = errors.lock() {
                errors.push(err);
            }
        }
    }))
    .await;

    let first = match errors.lock() {
        Ok(mut errors) if !errors.is_empty() => Some(errors.remove(0)),
        _ => None,
    };
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn save_one(
    download: Download<'_>,
    destination: &Path,
    index: usize,
    count: usize,
    source: Source,
    image: &ImageData,
) -> Result<(), ApiError> {
    let bytes = match source {
        Source::Base64 => STANDARD.decode(image.b64_json.as_bytes())?,
        Source::Url => {
            let fetch = async {
                let response = download
                    .http
                    .get(image.url.as_str())
                    .timeout(download.timeout)
                    .send()
                    .await?
                    .error_for_status()?;
                response.bytes().await
            };
            tokio::select! {
                _ = download.cancellation.cancelled() => return Err(ApiError::Cancelled),
                fetched = fetch => fetched.map_err(transport_error)?.to_vec(),
            }
        }
    };
    let path = to_image_path(index, count, destination)?;
    tokio::fs::write(&path, &bytes).await?;
    info!("Wrote image: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use hyper::{Body, Response};
    use std::collections::HashSet;

    struct Fetcher {
        http: reqwest::Client,
        timeout: Duration,
        cancellation: CancellationToken,
    }

    impl Fetcher {
        fn new() -> Self {
            Self {
                http: reqwest::Client::new(),
                timeout: Duration::from_secs(10),
                cancellation: CancellationToken::new(),
            }
        }

        fn download(&self) -> Download<'_> {
            Download {
                http: &self.http,
                timeout: self.timeout,
                cancellation: &self.cancellation,
            }
        }
    }

    /// A server that takes far too long over every image
    async fn stalled() -> Vec<ImageData> {
        let addr = test_server::serve(|_req| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Response::new(Body::from("late"))
        })
        .await;
        vec![ImageData {
            url: format!("http://{addr}/slow.png"),
            b64_json: String::new(),
        }]
    }

    fn encoded(contents: &[&[u8]]) -> Vec<ImageData> {
        contents
            .iter()
            .map(|c| ImageData {
                url: String::new(),
                b64_json: STANDARD.encode(c),
            })
            .collect()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn unique_names_are_hex_and_differ() {
        let a = unique_file_name();
        let b = unique_file_name();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn directory_gets_random_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = to_image_path(0, 1, dir.path()).unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[test]
    fn file_names_get_index_suffix_when_many() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cat.png");
        assert_eq!(to_image_path(0, 1, &target).unwrap(), target);
        assert_eq!(to_image_path(0, 3, &target).unwrap(), target);
        assert_eq!(
            to_image_path(2, 3, &target).unwrap(),
            dir.path().join("cat_2.png")
        );
        assert_eq!(
            to_image_path(0, 1, &dir.path().join("dog")).unwrap(),
            dir.path().join("dog.png")
        );
    }

    #[test]
    fn relative_paths_become_absolute() {
        let path = to_image_path(0, 1, Path::new("some-image.png")).unwrap();
        assert!(path.is_absolute());
        assert_eq!(path.file_name().unwrap(), "some-image.png");
    }

    #[test]
    fn home_is_expanded() {
        if let Some(dirs) = BaseDirs::new() {
            let path = to_image_path(0, 1, Path::new("~/pictures/x.png")).unwrap();
            assert_eq!(path, dirs.home_dir().join("pictures").join("x.png"));
        }
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = format!("{}/nowhere/", dir.path().display());
        assert!(to_image_path(0, 1, Path::new(&missing)).is_err());
    }

    #[tokio::test]
    async fn base64_images_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let originals: [&[u8]; 3] = [b"first image", b"second", b"\x89PNG third"];
        let images = encoded(&originals);
        save_images(Fetcher::new().download(), dir.path(), 2, &images)
            .await
            .unwrap();

        let files = files_in(dir.path());
        assert_eq!(files.len(), 3);
        let written: HashSet<Vec<u8>> = files.iter().map(|f| std::fs::read(f).unwrap()).collect();
        let expected: HashSet<Vec<u8>> = originals.iter().map(|o| o.to_vec()).collect();
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn numbered_files_for_a_named_target() {
        let dir = tempfile::tempdir().unwrap();
        let contents: [&[u8]; 2] = [b"a", b"b"];
        let images = encoded(&contents);
        save_images(Fetcher::new().download(), &dir.path().join("out.png"), 4, &images)
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("out.png")).unwrap(), b"a");
        assert_eq!(std::fs::read(dir.path().join("out_1.png")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn nothing_to_save() {
        let dir = tempfile::tempdir().unwrap();
        save_images(Fetcher::new().download(), dir.path(), 2, &[])
            .await
            .unwrap();
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn bad_base64_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = encoded(&[b"fine".as_slice()]);
        images.push(ImageData {
            url: String::new(),
            b64_json: "*** not base64 ***".to_string(),
        });
        match save_images(Fetcher::new().download(), dir.path(), 2, &images).await {
            Err(ApiError::Base64(_)) => (),
            other => panic!("{other:?}"),
        }
        assert_eq!(files_in(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn urls_are_downloaded() {
        let addr = test_server::serve(|req| async move {
            let body = format!("image at {}", req.uri().path());
            Response::new(Body::from(body))
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let images: Vec<ImageData> = ["/a.png", "/b.png"]
            .iter()
            .map(|p| ImageData {
                url: format!("http://{addr}{p}"),
                b64_json: String::new(),
            })
            .collect();
        save_images(Fetcher::new().download(), &dir.path().join("pic.png"), 1, &images)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pic.png")).unwrap(),
            "image at /a.png"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pic_1.png")).unwrap(),
            "image at /b.png"
        );
    }

    #[tokio::test]
    async fn first_image_decides_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            ImageData {
                url: String::new(),
                b64_json: STANDARD.encode(b"one"),
            },
            ImageData {
                url: "http://127.0.0.1:9/never".to_string(),
                b64_json: String::new(),
            },
        ];
        // The second is read as base64, and it has none
        save_images(Fetcher::new().download(), dir.path(), 2, &images)
            .await
            .unwrap();
        assert_eq!(files_in(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn stalled_download_times_out() {
        let images = stalled().await;
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = Fetcher::new();
        fetcher.timeout = Duration::from_millis(200);
        match save_images(fetcher.download(), dir.path(), 1, &images).await {
            Err(ApiError::Timeout) => (),
            other => panic!("{other:?}"),
        }
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn cancelled_download_stops() {
        let images = stalled().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new();
        fetcher.cancellation.cancel();
        match save_images(fetcher.download(), dir.path(), 1, &images).await {
            Err(ApiError::Cancelled) => (),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn null_fields_read_as_empty() {
        let image: ImageData =
            serde_json::from_str(r#"{"url":"https://x/y.png","b64_json":null}"#).unwrap();
        assert_eq!(image.url, "https://x/y.png");
        assert!(image.b64_json.is_empty());
    }

    #[test]
    fn missing_file_name_gets_png() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        assert!(!target.exists());
        assert_eq!(to_image_path(0, 1, &target).unwrap(), dir.path().join("out.png"));
    }
}
