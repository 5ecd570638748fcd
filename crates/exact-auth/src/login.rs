//! Browser login state machine
//!
//! `handle_event` is pure: given the current state and what the browser
//! landed on, it returns the next state and the action to perform.
//! `BrowserLoginFlow` executes those actions against a `Browser`.
//!
//! AwaitingLogin --LoginSubmitted--> AwaitingConsent --ConsentSubmitted--> Completed
//!               \--LoginSubmitted (already consented)--------------------> Completed

use reqwest::Url;
use tracing::{debug, info};

use crate::browser::{Browser, BrowserError, FormSelector};
use crate::constants::{
    ALLOW_BUTTON_ID, CONSENT_BYPASS_DOMAIN, CONSENT_FORM_ID, PASSWORD_FIELD, USERNAME_FIELD,
};
use crate::error::{Error, Result};
use crate::token::AuthorizationCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// Login form not yet submitted
    AwaitingLogin,
    /// Logged in, consent screen shown
    AwaitingConsent,
    /// Redirected back to the app; the code is in `final_url`
    Completed { final_url: Url },
}

#[derive(Debug, Clone)]
pub enum LoginEvent {
    /// Credentials submitted, browser now at `landed`
    LoginSubmitted { landed: Url },
    /// Consent approved, browser now at `landed`
    ConsentSubmitted { landed: Url },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    SubmitConsent,
    ExtractCode,
    None,
}

/// Handle a login transition. Pure function: no I/O.
pub fn handle_event(
    state: LoginState,
    event: LoginEvent,
    redirect_uri: &str,
) -> (LoginState, LoginAction) {
    match (state, event) {
        (LoginState::AwaitingLogin, LoginEvent::LoginSubmitted { landed }) => {
            if consent_already_granted(&landed, redirect_uri) {
                (
                    LoginState::Completed { final_url: landed },
                    LoginAction::ExtractCode,
                )
            } else {
                (LoginState::AwaitingConsent, LoginAction::SubmitConsent)
            }
        }
        (LoginState::AwaitingConsent, LoginEvent::ConsentSubmitted { landed }) => (
            LoginState::Completed { final_url: landed },
            LoginAction::ExtractCode,
        ),
        // Any other combination is ignored
        (state, _) => (state, LoginAction::None),
    }
}

/// Whether the login redirect already reached the app (or the Postman
/// callback), meaning the user approved this client before.
pub fn consent_already_granted(landed: &Url, redirect_uri: &str) -> bool {
    is_callback(landed, &normalize_redirect_uri(redirect_uri))
}

/// `redirect_uri` in the same serialization `Url` uses, so default ports and
/// host case compare equal. Unparseable values are used as given.
pub(crate) fn normalize_redirect_uri(redirect_uri: &str) -> String {
    Url::parse(redirect_uri)
        .map(String::from)
        .unwrap_or_else(|_| redirect_uri.to_owned())
}

/// `url` points at the app callback (`normalized_redirect` from
/// [`normalize_redirect_uri`]) or at the Postman callback.
pub(crate) fn is_callback(url: &Url, normalized_redirect: &str) -> bool {
    url.as_str().starts_with(normalized_redirect)
        || url
            .host_str()
            .is_some_and(|host| host.contains(CONSENT_BYPASS_DOMAIN))
}

/// Pull the URL-decoded `code` query parameter out of the final redirect.
pub fn extract_code(final_url: &Url) -> Result<AuthorizationCode> {
    final_url
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .map(AuthorizationCode::new)
        .ok_or_else(|| Error::CodeNotFound(strip_query(final_url)))
}

fn strip_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Drives one browser session from the authorize URL to an authorization code.
pub struct BrowserLoginFlow<'b> {
    browser: &'b mut dyn Browser,
    redirect_uri: String,
    state: LoginState,
}

impl<'b> BrowserLoginFlow<'b> {
    pub fn new(browser: &'b mut dyn Browser, redirect_uri: impl Into<String>) -> Self {
        Self {
            browser,
            redirect_uri: redirect_uri.into(),
            state: LoginState::AwaitingLogin,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Log in, approve consent if asked, and return the authorization code.
    pub async fn run(
        mut self,
        authorize_url: &Url,
        username: &str,
        password: &str,
    ) -> Result<AuthorizationCode> {
        let landed = self.submit_login(authorize_url, username, password).await?;
        let mut action = self.transition(LoginEvent::LoginSubmitted { landed });

        loop {
            match action {
                LoginAction::SubmitConsent => {
                    let landed = self.submit_consent().await?;
                    action = self.transition(LoginEvent::ConsentSubmitted { landed });
                }
                LoginAction::ExtractCode => {
                    let LoginState::Completed { final_url } = &self.state else {
                        return Err(Error::CodeNotFound(format!(
                            "login flow in state {:?}",
                            self.state
                        )));
                    };
                    let code = extract_code(final_url)?;
                    info!("authorization code received");
                    return Ok(code);
                }
                LoginAction::None => {
                    return Err(Error::CodeNotFound(format!(
                        "login flow stalled in state {:?}",
                        self.state
                    )));
                }
            }
        }
    }

    fn transition(&mut self, event: LoginEvent) -> LoginAction {
        let state = std::mem::replace(&mut self.state, LoginState::AwaitingLogin);
        let (state, action) = handle_event(state, event, &self.redirect_uri);
        debug!(?state, ?action, "login flow transition");
        self.state = state;
        action
    }

    async fn submit_login(&mut self, url: &Url, username: &str, password: &str) -> Result<Url> {
        debug!(url = %strip_query(url), "loading login page");
        self.browser.load_page(url).await.map_err(login_error)?;
        self.browser
            .select_form(&FormSelector::First)
            .map_err(login_error)?;
        self.browser
            .fill_field(USERNAME_FIELD, username)
            .map_err(login_error)?;
        self.browser
            .fill_field(PASSWORD_FIELD, password)
            .map_err(login_error)?;
        self.browser.submit_form(None).await.map_err(login_error)?;
        self.landed_url()
    }

    async fn submit_consent(&mut self) -> Result<Url> {
        debug!("submitting consent form");
        self.browser
            .select_form(&FormSelector::Id(CONSENT_FORM_ID.into()))
            .map_err(consent_error)?;
        self.browser
            .submit_form(Some(ALLOW_BUTTON_ID))
            .await
            .map_err(consent_error)?;
        self.landed_url()
    }

    fn landed_url(&self) -> Result<Url> {
        self.browser
            .current_url()
            .cloned()
            .ok_or_else(|| Error::Transport(BrowserError::NoPage.to_string()))
    }
}

fn login_error(err: BrowserError) -> Error {
    match err {
        BrowserError::Navigation(msg) => Error::Transport(msg),
        other => Error::LoginFormNotFound(other.to_string()),
    }
}

fn consent_error(err: BrowserError) -> Error {
    match err {
        BrowserError::Navigation(msg) => Error::Transport(msg),
        other => Error::ConsentFormNotFound(other.to_string()),
    }
}
