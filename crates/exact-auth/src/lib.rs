//! Exact Online OAuth2 authorization library
//!
//! Scripted browser login, token exchange and token refresh for the Exact
//! Online accounting API. The crate does not persist anything; callers store
//! the returned `TokenSet` themselves.
//!
//! Flow:
//! 1. `build_authorize_url()` from the client id and redirect URI
//! 2. `BrowserLoginFlow::run()` fills the login form, approves consent and
//!    returns the `AuthorizationCode` from the final redirect
//! 3. `TokenExchanger::exchange_code()` consumes the code for a `TokenSet`
//! 4. Later, `TokenExchanger::exchange_refresh_token()` renews it

pub mod authorize_url;
pub mod browser;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod http_browser;
pub mod login;
pub mod token;

pub use authorize_url::{AuthorizeOptions, build_authorize_url};
pub use browser::{Browser, BrowserError, BrowserFactory, BrowserFuture, FormSelector};
pub use constants::*;
pub use error::{Error, Result};
pub use exchange::{Credentials, TokenExchanger};
pub use http_browser::{HttpBrowser, HttpBrowserFactory};
pub use login::{BrowserLoginFlow, LoginAction, LoginEvent, LoginState};
pub use token::{AuthorizationCode, TokenResponse, TokenSet};
