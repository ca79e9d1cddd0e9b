//! Page-by-page capture of one book from the reader.
//!
//! The reader gives no explicit end-of-book signal. A book is considered
//! finished when the active page image disappears or when the reader shows
//! a page that was already downloaded.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::browser::{NavigationError, Navigator};
use crate::images::{AssetFetcher, ImagesError, PageReference};

pub const MANIFEST_FILE: &str = "capture.json";

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Book folders are created under this directory.
    pub output_dir: PathBuf,
    /// Upper bound on the wait for the next page after advancing.
    pub settle_delay: Duration,
    /// Stop after this many pages even if the reader keeps producing new ones.
    pub max_pages: usize,
    /// Consecutive page images without a URL tolerated before giving up.
    pub max_misses: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            settle_delay: Duration::from_millis(1500),
            max_pages: 2000,
            max_misses: 3,
        }
    }
}

/// Why a book's capture ended without an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// No active page image appeared within the element timeout.
    NoPageFound,
    /// The reader shows a page that was already downloaded.
    RepeatedPage,
    /// The page image could not be downloaded. The page stays unseen.
    FetchFailed(String),
    PageLimit,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoPageFound => f.write_str("could not find a new image on the page, assuming the book is finished"),
            StopReason::RepeatedPage => f.write_str("image already processed, assuming end of book"),
            StopReason::FetchFailed(err) => write!(f, "error downloading image: {err}"),
            StopReason::PageLimit => f.write_str("page limit reached"),
            StopReason::Interrupted => f.write_str("interrupted by operator"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("NavigationError: {0}")]
    Navigation(#[from] NavigationError),
    #[error("ImagesError: {0}")]
    Images(#[from] ImagesError),
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
    #[error("JSON conversion error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Operator stop request, shared between the Ctrl-C listener and the capture loop.
#[derive(Debug, Default)]
pub struct Interrupt {
    book_running: AtomicBool,
    requested: AtomicBool,
}

impl Interrupt {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_book(&self) {
        self.requested.store(false, Ordering::SeqCst);
        self.book_running.store(true, Ordering::SeqCst);
    }

    pub fn end_book(&self) {
        self.book_running.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Asks the running book to stop at the next page boundary.
    ///
    /// Returns `false` when no book is running or a stop was already asked
    /// for. The caller should then end the process.
    pub fn request_stop(&self) -> bool {
        self.book_running.load(Ordering::SeqCst) && !self.requested.swap(true, Ordering::SeqCst)
    }
}

/// Per-book state. Created empty for every book and handed back in the report.
#[derive(Debug, Default)]
pub struct CaptureState {
    seen: HashSet<PageReference>,
    first_reference: Option<PageReference>,
    folder: Option<PathBuf>,
    pages: usize,
}

impl CaptureState {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, reference: &PageReference) -> bool {
        self.seen.contains(reference)
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn next_index(&self) -> usize {
        self.pages + 1
    }

    /// Creates the book folder on the first call; later calls reuse it.
    fn folder_for(&mut self, reference: &PageReference, output_dir: &Path) -> Result<PathBuf> {

        if let Some(folder) = &self.folder {
            return Ok(folder.clone());
        }

        let folder = output_dir.join(book_folder_name(reference));
        fs::create_dir_all(&folder)?;
        println!("Saving images to folder: {}", folder.display());

        self.first_reference = Some(reference.clone());
        self.folder = Some(folder.clone());
        Ok(folder)
    }

    fn record(&mut self, reference: PageReference) {
        self.seen.insert(reference);
        self.pages += 1;
    }

    fn finish(self, stop: StopReason) -> CaptureReport {
        CaptureReport {
            folder: self.folder,
            first_reference: self.first_reference,
            pages: self.pages,
            seen: self.seen,
            stop,
        }
    }
}

#[derive(Debug)]
pub struct CaptureReport {
    pub folder: Option<PathBuf>,
    pub first_reference: Option<PageReference>,
    pub pages: usize,
    pub seen: HashSet<PageReference>,
    pub stop: StopReason,
}

#[derive(Serialize)]
struct CaptureManifest<'a> {
    first_reference: &'a str,
    pages: usize,
    stop: &'a StopReason,
    date: String,
}

/// `book_` followed by the first 10 hex digits of the SHA-256 of the reference.
pub fn book_folder_name(first_reference: &PageReference) -> String {
    let digest = Sha256::digest(first_reference.as_str().as_bytes());
    let hash = hex::encode(digest);
    format!("book_{}", &hash[..10])
}

pub fn page_file_name(index: usize) -> String {
    format!("{:03}.png", index)
}

/// Captures the book currently open in `navigator`, one page per iteration.
///
/// Stop conditions that describe the end of a book are returned in the report.
/// Driver and disk failures are returned as errors.
pub async fn capture_book<N, F>(
    navigator: &N,
    fetcher: &F,
    config: &CaptureConfig,
    interrupt: &Interrupt,
) -> Result<CaptureReport>
where
    N: Navigator,
    F: AssetFetcher,
{
    println!("\n--- Starting to scrape a new book ---");

    let mut state = CaptureState::new();
    let mut misses = 0;
    let mut last_shown: Option<PageReference> = None;

    let stop = loop {
        if interrupt.is_requested() {
            break StopReason::Interrupted;
        }
        if state.pages() >= config.max_pages {
            tracing::warn!(max_pages = config.max_pages, "stopping at page limit");
            break StopReason::PageLimit;
        }

        let reference = match navigator.current_reference() {
            Ok(reference) => reference,
            Err(NavigationError::NotFound(waited)) => {
                tracing::debug!(?waited, "active page image never appeared");
                break StopReason::NoPageFound;
            }
            Err(NavigationError::MissingReference) => {
                misses += 1;
                println!("Found the image element, but could not extract a URL.");
                if misses >= config.max_misses {
                    break StopReason::NoPageFound;
                }
                navigator.advance()?;
                navigator.wait_for_change(last_shown.as_ref(), config.settle_delay)?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        misses = 0;
        last_shown = Some(reference.clone());

        if state.has_seen(&reference) {
            break StopReason::RepeatedPage;
        }

        let index = state.next_index();
        println!("Found image URL for page {}: {}", index, reference);

        let folder = state.folder_for(&reference, &config.output_dir)?;
        let session = navigator.session()?;

        let image = match fetcher.fetch(&reference, &session).await {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(%reference, error = %err, "page download failed");
                break StopReason::FetchFailed(err.to_string());
            }
        };

        let path = folder.join(page_file_name(index));
        image.write_to_disk(&path)?;
        println!("Image downloaded: {}", path.display());
        state.record(reference.clone());

        if state.pages() >= config.max_pages {
            tracing::warn!(max_pages = config.max_pages, "stopping at page limit");
            break StopReason::PageLimit;
        }

        navigator.advance()?;
        if !navigator.wait_for_change(Some(&reference), config.settle_delay)? {
            tracing::debug!(%reference, "reader still shows the same page after advancing");
        }
    };

    let report = state.finish(stop);
    write_manifest(&report)?;

    println!("--- Finished scraping the current book ({}): {} ---", report.pages, report.stop);
    Ok(report)
}

fn write_manifest(report: &CaptureReport) -> Result<()> {

    let (Some(folder), Some(first)) = (&report.folder, &report.first_reference) else {
        return Ok(());
    };

    let date = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
        .to_string();

    let manifest = CaptureManifest {
        first_reference: first.as_str(),
        pages: report.pages,
        stop: &report.stop,
        date,
    };

    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(folder.join(MANIFEST_FILE), json)?;
    Ok(())
}
