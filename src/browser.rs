use headless_chrome;
use headless_chrome::{LaunchOptions, Tab};
use headless_chrome::browser::tab::NoElementFound;
use anyhow;
use url::{Url, ParseError};
use thiserror::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::images::PageReference;
use crate::session::Session;

/// Image element of the page currently shown by the page-flip reader.
pub const ACTIVE_PAGE_IMAGE: &str = "svg.page-flip__image--active image";

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("ChromeError: {0}")]
    ChromeError(#[from] anyhow::Error),
    #[error("UrlError, can't parse given URL: {0}")]
    UrlError(#[from] ParseError),
}
pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("no page image appeared within {0:?}")]
    NotFound(Duration),
    #[error("page image element carries no href")]
    MissingReference,
    #[error("ChromeError: {0}")]
    Driver(#[from] anyhow::Error),
}

/// A view that can be paged forward one page at a time.
pub trait Navigator {
    /// Reference of the page on display. Waits a bounded time for it to appear.
    fn current_reference(&self) -> std::result::Result<PageReference, NavigationError>;

    fn advance(&self) -> std::result::Result<(), NavigationError>;

    /// Credentials needed to download what the view shows.
    fn session(&self) -> std::result::Result<Session, NavigationError>;

    /// Waits until a reference other than `previous` is displayed. With no
    /// previous page, any readable reference counts as a change.
    /// Returns `false` if nothing changed within `timeout`.
    fn wait_for_change(&self, previous: Option<&PageReference>, timeout: Duration) -> std::result::Result<bool, NavigationError>;
}

/// Polls `peek` until it yields a reference, or fails with `NotFound` once `timeout` has passed.
pub fn poll_for_reference<P>(mut peek: P, timeout: Duration, poll_interval: Duration) -> std::result::Result<PageReference, NavigationError>
where
    P: FnMut() -> std::result::Result<Option<PageReference>, NavigationError>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(reference) = peek()? {
            return Ok(reference);
        }
        if Instant::now() >= deadline {
            return Err(NavigationError::NotFound(timeout));
        }
        std::thread::sleep(poll_interval);
    }
}

/// Polls `peek` until it yields a reference different from `previous`.
pub fn poll_for_change<P>(mut peek: P, previous: Option<&PageReference>, timeout: Duration, poll_interval: Duration) -> std::result::Result<bool, NavigationError>
where
    P: FnMut() -> std::result::Result<Option<PageReference>, NavigationError>,
{
    let deadline = Instant::now() + timeout;

    loop {
        // The old image may be torn down before the new one is tagged active.
        match peek() {
            Ok(Some(reference)) if Some(&reference) != previous => return Ok(true),
            Ok(_) | Err(NavigationError::MissingReference) => {}
            Err(err) => return Err(err),
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(poll_interval);
    }
}

/// `find_element` reports an absent node as `NoElementFound`. Anything else
/// means the tab or the DevTools connection is gone.
fn absent_or_driver_error(err: anyhow::Error) -> std::result::Result<Option<PageReference>, NavigationError> {
    if err.downcast_ref::<NoElementFound>().is_some() {
        Ok(None)
    } else {
        Err(NavigationError::Driver(err))
    }
}

pub struct Browser (headless_chrome::Browser);

impl Browser {

    /// Chrome idles while the operator logs in, so the connection must outlive that.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 4);

    /// Launches a visible Chrome window the operator can log in with.
    pub fn new() -> Result<Self> {

        let options = LaunchOptions::default_builder()
            .headless(false)
            .idle_browser_timeout(Self::IDLE_TIMEOUT)
            .build()
            .map_err(|err| anyhow::anyhow!("invalid chrome launch options: {err}"))?;

        Ok(Self(headless_chrome::Browser::new(options)?))
    }

    fn url_to_tab(&self, url: &str) -> Result<Arc<Tab>> {

        Url::parse(url)?;
        let tab = self.0.new_tab()?;

        tab.navigate_to(url)?.wait_until_navigated()?;

        Ok(tab)

    }

    pub fn open_viewer(&self, url: &str, element_timeout: Duration) -> Result<Viewer> {

        let tab = self.url_to_tab(url)?;
        tracing::info!(url, "opened reader tab");

        Ok(Viewer::from_tab(tab, element_timeout))
    }
}

/// The reader tab, driven through the Chrome DevTools protocol.
pub struct Viewer {
    tab: Arc<Tab>,
    element_timeout: Duration,
    poll_interval: Duration,
}

impl Viewer {

    pub fn from_tab(tab: Arc<Tab>, element_timeout: Duration) -> Self {
        Self { tab, element_timeout, poll_interval: Duration::from_millis(100) }
    }

    pub fn url(&self) -> String {
        self.tab.get_url()
    }

    /// One look at the DOM: `Ok(None)` when the page image is not there yet.
    fn peek_reference(&self) -> std::result::Result<Option<PageReference>, NavigationError> {

        let element = match self.tab.find_element(ACTIVE_PAGE_IMAGE) {
            Ok(element) => element,
            Err(err) => return absent_or_driver_error(err),
        };

        let attributes = element.get_attributes()?.unwrap_or_default();

        match image_href(&attributes) {
            Some(href) => Ok(Some(PageReference::new(href))),
            None => Err(NavigationError::MissingReference),
        }
    }
}

impl Navigator for Viewer {

    fn current_reference(&self) -> std::result::Result<PageReference, NavigationError> {
        poll_for_reference(|| self.peek_reference(), self.element_timeout, self.poll_interval)
    }

    fn advance(&self) -> std::result::Result<(), NavigationError> {
        self.tab.press_key("ArrowRight")?;
        Ok(())
    }

    fn session(&self) -> std::result::Result<Session, NavigationError> {
        let cookies = self.tab.get_cookies()?;
        Ok(Session::from_pairs(cookies.into_iter().map(|c| (c.name, c.value))))
    }

    fn wait_for_change(&self, previous: Option<&PageReference>, timeout: Duration) -> std::result::Result<bool, NavigationError> {
        poll_for_change(|| self.peek_reference(), previous, timeout, self.poll_interval)
    }
}

/// Picks the image URL out of a flat `[name, value, name, value, ..]` attribute list.
///
/// SVG `<image>` elements carry the URL either as `href` or the older `xlink:href`.
pub fn image_href(attributes: &[String]) -> Option<&str> {

    let lookup = |wanted: &str| {
        attributes
            .chunks_exact(2)
            .find(|pair| pair[0] == wanted)
            .map(|pair| pair[1].as_str())
            .filter(|value| !value.is_empty())
    };

    lookup("href").or_else(|| lookup("xlink:href"))
}
