//! Scripted browser abstraction
//!
//! The login flow only needs to load a page, pick a form, fill fields and
//! submit. `HttpBrowser` does this over reqwest with a cookie jar; tests use
//! scripted fakes.

use std::future::Future;
use std::pin::Pin;

use reqwest::Url;

/// Boxed future returned by `Browser` methods (dyn-compatible).
pub type BrowserFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which form on the current page to operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormSelector {
    /// First `<form>` in document order
    First,
    /// `<form id="...">`
    Id(String),
}

/// Errors from browser operations.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("no page loaded")]
    NoPage,

    #[error("form not found: {0}")]
    FormNotFound(String),

    #[error("no form selected")]
    NoFormSelected,

    #[error("button not found: {0}")]
    ButtonNotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// A stateful browsing session (cookies, current page, selected form).
pub trait Browser: Send {
    /// Navigate to `url`, following redirects.
    fn load_page<'a>(&'a mut self, url: &'a Url) -> BrowserFuture<'a, Result<(), BrowserError>>;

    /// Select a form on the current page for `fill_field` / `submit_form`.
    fn select_form(&mut self, selector: &FormSelector) -> Result<(), BrowserError>;

    /// Set a field on the selected form, adding it if the form lacks it.
    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), BrowserError>;

    /// Submit the selected form via the button with `button_id`, or via the
    /// form's first button when `None`.
    fn submit_form<'a>(
        &'a mut self,
        button_id: Option<&'a str>,
    ) -> BrowserFuture<'a, Result<(), BrowserError>>;

    /// URL of the current page (the last redirect target after navigation).
    fn current_url(&self) -> Option<&Url>;
}

/// Starts a fresh browser session for one login.
pub trait BrowserFactory: Send + Sync {
    /// `redirect_uri` is where navigation must stop: the app's callback is
    /// never fetched.
    fn launch(&self, redirect_uri: &str) -> Result<Box<dyn Browser>, BrowserError>;
}

impl<F> BrowserFactory for F
where
    F: Fn(&str) -> Result<Box<dyn Browser>, BrowserError> + Send + Sync,
{
    fn launch(&self, redirect_uri: &str) -> Result<Box<dyn Browser>, BrowserError> {
        self(redirect_uri)
    }
}
