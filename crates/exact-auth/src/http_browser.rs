//! reqwest-backed `Browser`
//!
//! Replays the login like a form-filling browser: a cookie jar keeps the
//! provider session between pages, HTML forms are read with `scraper`, and
//! redirects are followed until they point at the app's redirect URI. That
//! last redirect is recorded as the current URL but never fetched, so the
//! callback does not need to be reachable from here.

use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{RequestBuilder, Url};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::browser::{Browser, BrowserError, BrowserFactory, BrowserFuture, FormSelector};
use crate::login::{is_callback, normalize_redirect_uri};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
struct Page {
    url: Url,
    html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
struct SubmitButton {
    id: Option<String>,
    name: Option<String>,
    value: String,
}

#[derive(Debug, Clone)]
struct Form {
    action: Url,
    method: FormMethod,
    fields: Vec<(String, String)>,
    buttons: Vec<SubmitButton>,
}

/// Cookie-keeping HTTP session that reads and submits HTML forms.
pub struct HttpBrowser {
    client: reqwest::Client,
    page: Option<Page>,
    form: Option<Form>,
}

impl HttpBrowser {
    /// Session that stops following redirects at `redirect_uri`.
    pub fn new(redirect_uri: &str, timeout: Duration) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(stop_at(normalize_redirect_uri(redirect_uri)))
            .timeout(timeout)
            .build()
            .map_err(|e| BrowserError::Navigation(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client. It should keep cookies.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            page: None,
            form: None,
        }
    }

    async fn navigate(&mut self, request: RequestBuilder) -> Result<(), BrowserError> {
        self.form = None;
        let response = request
            .send()
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        let status = response.status();

        // A redirect reaching us means the policy stopped at the app callback
        let page = if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| BrowserError::Navigation(format!("{status} without Location")))?;
            let url = response
                .url()
                .join(location)
                .map_err(|e| BrowserError::Navigation(format!("bad Location {location}: {e}")))?;
            Page {
                url,
                html: String::new(),
            }
        } else {
            let url = response.url().clone();
            let html = response
                .text()
                .await
                .map_err(|e| BrowserError::Navigation(format!("reading {url}: {e}")))?;
            Page { url, html }
        };

        debug!(
            status = status.as_u16(),
            host = page.url.host_str().unwrap_or(""),
            path = page.url.path(),
            "page loaded"
        );
        self.page = Some(page);
        Ok(())
    }

    fn submit_request(&self, button_id: Option<&str>) -> Result<RequestBuilder, BrowserError> {
        let form = self.form.as_ref().ok_or(BrowserError::NoFormSelected)?;
        let button = match button_id {
            Some(id) => Some(
                form.buttons
                    .iter()
                    .find(|b| b.id.as_deref() == Some(id))
                    .ok_or_else(|| BrowserError::ButtonNotFound(id.to_owned()))?,
            ),
            None => form.buttons.first(),
        };

        let mut fields = form.fields.clone();
        if let Some(SubmitButton {
            name: Some(name),
            value,
            ..
        }) = button
        {
            fields.push((name.clone(), value.clone()));
        }

        Ok(match form.method {
            FormMethod::Post => self.client.post(form.action.clone()).form(&fields),
            FormMethod::Get => {
                let mut url = form.action.clone();
                url.query_pairs_mut().clear().extend_pairs(&fields);
                self.client.get(url)
            }
        })
    }
}

impl Browser for HttpBrowser {
    fn load_page<'a>(&'a mut self, url: &'a Url) -> BrowserFuture<'a, Result<(), BrowserError>> {
        Box::pin(async move {
            let request = self.client.get(url.clone());
            self.navigate(request).await
        })
    }

    fn select_form(&mut self, selector: &FormSelector) -> Result<(), BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        self.form = Some(parse_form(page, selector)?);
        Ok(())
    }

    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), BrowserError> {
        let form = self.form.as_mut().ok_or(BrowserError::NoFormSelected)?;
        match form.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value.to_owned(),
            None => form.fields.push((name.to_owned(), value.to_owned())),
        }
        Ok(())
    }

    fn submit_form<'a>(
        &'a mut self,
        button_id: Option<&'a str>,
    ) -> BrowserFuture<'a, Result<(), BrowserError>> {
        Box::pin(async move {
            let request = self.submit_request(button_id)?;
            self.navigate(request).await
        })
    }

    fn current_url(&self) -> Option<&Url> {
        self.page.as_ref().map(|p| &p.url)
    }
}

/// Launches one `HttpBrowser` per login.
#[derive(Debug, Clone)]
pub struct HttpBrowserFactory {
    timeout: Duration,
}

impl HttpBrowserFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BrowserFactory for HttpBrowserFactory {
    fn launch(&self, redirect_uri: &str) -> Result<Box<dyn Browser>, BrowserError> {
        Ok(Box::new(HttpBrowser::new(redirect_uri, self.timeout)?))
    }
}

fn stop_at(redirect_uri: String) -> Policy {
    Policy::custom(move |attempt| {
        if is_callback(attempt.url(), &redirect_uri) {
            attempt.stop()
        } else if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

fn selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| BrowserError::FormNotFound(format!("selector {css}: {e}")))
}

/// Read the selected form's action, method, fields and submit buttons.
///
/// Runs synchronously: the parsed document is not `Send` and must not live
/// across an await.
fn parse_form(page: &Page, form_selector: &FormSelector) -> Result<Form, BrowserError> {
    let document = Html::parse_document(&page.html);
    let css = match form_selector {
        FormSelector::First => "form".to_owned(),
        FormSelector::Id(id) => format!("form[id=\"{id}\"]"),
    };
    let form = document
        .select(&selector(&css)?)
        .next()
        .ok_or_else(|| BrowserError::FormNotFound(format!("{css} on {}", page.url.path())))?;

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => page
            .url
            .join(action)
            .map_err(|e| BrowserError::Navigation(format!("bad form action {action}: {e}")))?,
        _ => page.url.clone(),
    };
    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };

    let mut fields = Vec::new();
    let mut buttons = Vec::new();
    for element in form.select(&selector("input, button, textarea, select")?) {
        let el = element.value();
        let kind = el.attr("type").unwrap_or("").to_ascii_lowercase();
        match (el.name(), kind.as_str()) {
            ("input", "submit" | "image") | ("button", "submit" | "") => {
                buttons.push(SubmitButton {
                    id: el.attr("id").map(str::to_owned),
                    name: el.attr("name").map(str::to_owned),
                    value: el.attr("value").unwrap_or("").to_owned(),
                });
            }
            ("button", _) | ("input", "button" | "reset" | "file") => {}
            ("input", "checkbox" | "radio") if el.attr("checked").is_none() => {}
            _ => {
                if let Some(name) = el.attr("name") {
                    fields.push((name.to_owned(), field_value(element)?));
                }
            }
        }
    }

    Ok(Form {
        action,
        method,
        fields,
        buttons,
    })
}

fn field_value(element: ElementRef<'_>) -> Result<String, BrowserError> {
    Ok(match element.value().name() {
        "textarea" => element.text().collect(),
        "select" => {
            let options = selector("option")?;
            let chosen = element
                .select(&options)
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| element.select(&options).next());
            chosen
                .map(|o| {
                    o.value()
                        .attr("value")
                        .map(str::to_owned)
                        .unwrap_or_else(|| o.text().collect())
                })
                .unwrap_or_default()
        }
        _ => element.value().attr("value").unwrap_or("").to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ALLOW_BUTTON_ID, CONSENT_FORM_ID, USERNAME_FIELD};
    use crate::login::BrowserLoginFlow;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PAGE: &str = r#"
<html><body>
  <form method="post" action="/login">
    <input type="hidden" name="__RequestVerificationToken" value="tok123">
    <input type="text" name="UserNameField">
    <input type="password" name="PasswordField">
    <input type="checkbox" name="RememberMe">
    <input type="submit" name="LoginButton" id="LoginButton" value="Log in">
  </form>
</body></html>"#;

    const CONSENT_PAGE: &str = r#"
<html><body>
  <form id="SearchForm" action="/search"><input name="q"></form>
  <form id="PublicOAuth2Form" method="POST" action="/consent">
    <input type="hidden" name="ClientId" value="C1">
    <select name="Scope"><option value="read">Read</option><option value="all" selected>All</option></select>
    <button type="submit" id="AllowButton" name="Allow" value="1">Allow</button>
    <button type="submit" id="DenyButton" name="Deny" value="1">Deny</button>
  </form>
</body></html>"#;

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html; charset=utf-8")
            .set_body_string(body)
    }

    fn page(url: &str, body: &str) -> Page {
        Page {
            url: Url::parse(url).unwrap(),
            html: body.to_owned(),
        }
    }

    #[test]
    fn parses_login_form() {
        let form = parse_form(
            &page("https://host/api/oauth2/auth/?client_id=C1", LOGIN_PAGE),
            &FormSelector::First,
        )
        .unwrap();
        assert_eq!(form.action.as_str(), "https://host/login");
        assert_eq!(form.method, FormMethod::Post);
        assert_eq!(
            form.fields,
            vec![
                ("__RequestVerificationToken".to_string(), "tok123".to_string()),
                ("UserNameField".into(), "".into()),
                ("PasswordField".into(), "".into()),
            ]
        );
        assert_eq!(form.buttons.len(), 1);
        assert_eq!(form.buttons[0].name.as_deref(), Some("LoginButton"));
    }

    #[test]
    fn selects_form_by_id() {
        let form = parse_form(
            &page("https://host/allow", CONSENT_PAGE),
            &FormSelector::Id(CONSENT_FORM_ID.into()),
        )
        .unwrap();
        assert_eq!(form.action.as_str(), "https://host/consent");
        assert_eq!(
            form.fields,
            vec![
                ("ClientId".to_string(), "C1".to_string()),
                ("Scope".into(), "all".into()),
            ]
        );
        let ids: Vec<_> = form.buttons.iter().filter_map(|b| b.id.as_deref()).collect();
        assert_eq!(ids, vec!["AllowButton", "DenyButton"]);
    }

    #[test]
    fn missing_form_is_reported() {
        let err = parse_form(
            &page("https://host/allow", LOGIN_PAGE),
            &FormSelector::Id(CONSENT_FORM_ID.into()),
        )
        .unwrap_err();
        assert!(matches!(err, BrowserError::FormNotFound(_)));
    }

    #[test]
    fn form_without_action_posts_back_to_page() {
        let form = parse_form(
            &page("https://host/page?x=1", "<form><input name=a value=b></form>"),
            &FormSelector::First,
        )
        .unwrap();
        assert_eq!(form.action.as_str(), "https://host/page?x=1");
        assert_eq!(form.method, FormMethod::Get);
    }

    #[test]
    fn fill_field_requires_selected_form() {
        let mut browser = HttpBrowser::with_client(reqwest::Client::new());
        assert!(matches!(
            browser.fill_field(USERNAME_FIELD, "u"),
            Err(BrowserError::NoFormSelected)
        ));
        assert!(matches!(
            browser.select_form(&FormSelector::First),
            Err(BrowserError::NoPage)
        ));
    }

    #[tokio::test]
    async fn login_and_consent_against_live_pages() {
        let server = MockServer::start().await;
        let redirect_uri = "https://app.example.com/cb";

        Mock::given(method("GET"))
            .and(path("/api/oauth2/auth/"))
            .respond_with(html(LOGIN_PAGE))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("UserNameField=alice"))
            .and(body_string_contains("PasswordField=p%40ss"))
            .and(body_string_contains("__RequestVerificationToken=tok123"))
            .and(body_string_contains("LoginButton=Log+in"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/allow")
                    .insert_header("set-cookie", "session=abc; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/allow"))
            .and(header("cookie", "session=abc"))
            .respond_with(html(CONSENT_PAGE))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/consent"))
            .and(body_string_contains("Allow=1"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{redirect_uri}?code=XYZ%21789").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let authorize =
            Url::parse(&format!("{}/api/oauth2/auth/?client_id=C1", server.uri())).unwrap();
        let mut browser = HttpBrowser::new(redirect_uri, Duration::from_secs(5)).unwrap();
        let code = BrowserLoginFlow::new(&mut browser, redirect_uri)
            .run(&authorize, "alice", "p@ss")
            .await
            .unwrap();

        assert_eq!(code.as_str(), "XYZ!789");
        assert_eq!(
            browser.current_url().unwrap().as_str(),
            "https://app.example.com/cb?code=XYZ%21789"
        );
    }

    #[tokio::test]
    async fn consent_without_allow_button() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/allow"))
            .respond_with(html(
                r#"<form id="PublicOAuth2Form" method="post"><button id="DenyButton">No</button></form>"#,
            ))
            .mount(&server)
            .await;

        let mut browser = HttpBrowser::new("https://app/cb", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/allow", server.uri())).unwrap();
        browser.load_page(&url).await.unwrap();
        browser
            .select_form(&FormSelector::Id(CONSENT_FORM_ID.into()))
            .unwrap();
        let err = browser.submit_form(Some(ALLOW_BUTTON_ID)).await.unwrap_err();
        assert!(matches!(err, BrowserError::ButtonNotFound(ref id) if id == ALLOW_BUTTON_ID));
    }

    #[tokio::test]
    async fn stops_at_callback_written_with_default_port_and_upper_case_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/done"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "https://app.example.com/cb?code=A1"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut browser =
            HttpBrowser::new("https://APP.example.com:443/cb", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/done", server.uri())).unwrap();
        browser.load_page(&url).await.unwrap();
        assert_eq!(
            browser.current_url().unwrap().as_str(),
            "https://app.example.com/cb?code=A1"
        );
    }

    #[test]
    fn factory_launches_fresh_browser() {
        let factory = HttpBrowserFactory::new(Duration::from_secs(1));
        let browser = factory.launch("https://app/cb").unwrap();
        assert!(browser.current_url().is_none());
    }
}
