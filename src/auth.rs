use std::fmt;

use base64::Engine;

/// Agent email plus API token, sent as Basic auth on every request.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    api_token: String,
}

impl Credentials {
    pub fn new(email: String, api_token: String) -> Self {
        Self { email, api_token }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Value for the `Authorization` header. Token auth uses the
    /// `{email}/token` form as the Basic username.
    pub fn auth_header(&self) -> String {
        let creds = format!("{}/token:{}", self.email, self.api_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}
