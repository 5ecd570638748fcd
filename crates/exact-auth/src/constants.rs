//! Exact Online OAuth constants
//!
//! Endpoint paths are relative to the configured `base_url` (the region
//! host, e.g. `https://start.exactonline.nl`). The form and button
//! identifiers match the provider's hosted login and consent pages.

/// Authorization endpoint (browser login + consent)
pub const AUTHORIZE_PATH: &str = "/api/oauth2/auth/";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_PATH: &str = "/api/oauth2/token";

/// Username input on the login form
pub const USERNAME_FIELD: &str = "UserNameField";

/// Password input on the login form
pub const PASSWORD_FIELD: &str = "PasswordField";

/// `id` of the consent form shown to users who have not yet approved the app
pub const CONSENT_FORM_ID: &str = "PublicOAuth2Form";

/// `id` of the approve button on the consent form
pub const ALLOW_BUTTON_ID: &str = "AllowButton";

/// Redirect host that implies consent was already granted.
/// Postman's OAuth helper registers its own callback, which Exact redirects
/// to straight after login.
pub const CONSENT_BYPASS_DOMAIN: &str = "getpostman";
