use crate::auth::AuthEngine;

/// Shared state for the auth handlers, installed once as an `Extension`.
#[derive(Debug)]
pub struct AuthState {
    engine: AuthEngine,
    secure_cookies: bool,
}

impl AuthState {
    #[must_use]
    pub fn new(engine: AuthEngine, secure_cookies: bool) -> Self {
        Self {
            engine,
            secure_cookies,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &AuthEngine {
        &self.engine
    }

    /// Whether refresh cookies carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}
