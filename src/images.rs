use thiserror::Error;
use url::{Url, ParseError};
use reqwest;
use reqwest::header::COOKIE;
use base64::Engine;
use async_trait::async_trait;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::Session;

/// Opaque reference to one page image, as read from the viewer.
///
/// Usually a relative URL, sometimes absolute or an inline `data:` URL.
/// Two references are the same page only if the strings are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageReference(String);

impl PageReference {

    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:image")
    }
}

impl fmt::Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageReference {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

pub struct Image {
    pub image_bytes: Vec<u8>,
    pub source: String,
}

/// Why a page image could not be obtained. Never retried.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("UrlError: {0}")]
    Url(#[from] ParseError),
    #[error("ReqwestError: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed inline image: {0}")]
    InlineData(String),
}

/// Failures persisting a downloaded page.
#[derive(Error, Debug)]
pub enum ImagesError {
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("refusing to overwrite existing page file {}", .0.display())]
    AlreadyExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, ImagesError>;

impl Image {

    fn parse_data_url(src: &str) -> std::result::Result<Self, FetchError> {
        // data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAA...

        let (_meta, data) = src
            .split_once(',')
            .ok_or_else(|| FetchError::InlineData("no ',' separating header and payload".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|err| FetchError::InlineData(err.to_string()))?;

        Ok(Image {
            image_bytes: bytes,
            source: "inline".to_string(),
        })
    }

    /// Writes the image to `path`. An existing file is never replaced.
    pub fn write_to_disk(&self, path: &Path) -> Result<()> {

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ImagesError::AlreadyExists(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        file.write_all(&self.image_bytes)?;
        Ok(())
    }
}

/// Downloads the image behind a page reference.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, reference: &PageReference, session: &Session) -> std::result::Result<Image, FetchError>;
}

/// Fetches page images over HTTP with the browser's cookies attached.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFetcher {

    const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: &str) -> std::result::Result<Self, FetchError> {

        let base_url = Url::parse(base_url)?;
        let client = Self::init_client()?;

        Ok(Self { client, base_url })
    }

    fn init_client() -> std::result::Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a possibly relative reference against the base origin.
    pub fn resolve(&self, reference: &PageReference) -> std::result::Result<Url, FetchError> {
        Ok(self.base_url.join(reference.as_str())?)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {

    async fn fetch(&self, reference: &PageReference, session: &Session) -> std::result::Result<Image, FetchError> {

        if reference.is_inline() {
            return Image::parse_data_url(reference.as_str());
        }

        let img_url = self.resolve(reference)?;
        tracing::debug!(url = %img_url, cookies = session.len(), "fetching page image");

        let mut request = self.client.get(img_url.clone());
        if let Some(cookies) = session.cookie_header() {
            request = request.header(COOKIE, cookies);
        }

        let response = request
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?.to_vec();

        Ok(Image {
            image_bytes: bytes,
            source: img_url.to_string(),
        })
    }
}
