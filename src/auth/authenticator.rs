use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{OAuthApi, RefreshResult};
use crate::app::{AppEvent, Notifier};
use crate::auth::Session;
use crate::config::TokenType;

const TOKEN_EXPIRED: &str = "token_expired";
const TOKEN_NONEXISTENT: &str = "token_nonexistent";
const TOKEN_INVALID_GRANT: &str = "invalid_grant";
const USER_DISABLED: &str = "user_is_disabled";
const JWT_TOKEN_EXPIRED: &str = "Token has expired.";
const JWT_INVALID_TOKEN: &str = "Invalid token.";
const JWT_USER_DISABLED: &str = "User account is disabled.";

/// Recovers from 401 responses by refreshing or replaying the access token.
///
/// Refreshes are single-flight: callers queue on `refresh_guard`, and a
/// caller that gets the guard after someone else refreshed simply picks up
/// the new token instead of spending the refresh token a second time.
pub struct Authenticator {
    session: Arc<Session>,
    oauth: Arc<dyn OAuthApi + Send + Sync>,
    notifier: Notifier,
    token_type: TokenType,
    backoff: Duration,
    refresh_guard: Mutex<()>,
}

impl Authenticator {
    pub fn new(
        session: Arc<Session>,
        oauth: Arc<dyn OAuthApi + Send + Sync>,
        notifier: Notifier,
        token_type: TokenType,
        backoff: Duration,
    ) -> Self {
        Self {
            session,
            oauth,
            notifier,
            token_type,
            backoff,
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Decide how to recover from a 401.
    ///
    /// `request_token` is the access token the failed request carried and
    /// `body` its response body. Returns the access token to retry with, or
    /// `None` to give up and surface the 401.
    pub async fn authenticate(&self, request_token: Option<&str>, body: &[u8]) -> Option<String> {
        if self.session.refresh_token().is_empty() {
            debug!("No refresh token stored, not retrying");
            return None;
        }

        let code = extract_error_code(body, self.token_type)?;
        debug!("401 with error code {:?}", code);

        match code.as_str() {
            TOKEN_EXPIRED | JWT_TOKEN_EXPIRED => self.refresh(request_token).await,
            TOKEN_NONEXISTENT | TOKEN_INVALID_GRANT | JWT_INVALID_TOKEN => {
                if let Some(stored) = self.newer_token(request_token) {
                    debug!("Request used a stale token, retrying with the stored one");
                    return Some(stored);
                }
                self.logout();
                None
            }
            USER_DISABLED | JWT_USER_DISABLED => {
                self.logout();
                None
            }
            _ => None,
        }
    }

    async fn refresh(&self, request_token: Option<&str>) -> Option<String> {
        let _guard = self.refresh_guard.lock().await;

        // Someone refreshed while we waited for the guard.
        if let Some(stored) = self.newer_token(request_token) {
            return Some(stored);
        }

        let refresh_token = self.session.refresh_token();
        if refresh_token.is_empty() {
            return None;
        }

        match self.oauth.refresh(&refresh_token).await {
            Ok(RefreshResult::Refreshed(pair)) => {
                let access_token = pair.access_token.clone();
                // The session keeps the new pair in memory even if the write fails.
                if let Err(e) = self.session.set_tokens(pair) {
                    warn!("Failed to persist refreshed tokens: {}", e);
                }
                info!("Access token refreshed");
                Some(access_token)
            }
            Ok(RefreshResult::InProgress) => {
                debug!("Refresh already in progress, waiting {:?}", self.backoff);
                tokio::time::sleep(self.backoff).await;
                // Another process may have finished the refresh meanwhile.
                if let Err(e) = self.session.reload_tokens() {
                    warn!("Failed to reload tokens: {}", e);
                }
                self.newer_token(request_token)
            }
            Ok(RefreshResult::Failed) => None,
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                None
            }
        }
    }

    /// The stored access token, if it is set and differs from `request_token`.
    fn newer_token(&self, request_token: Option<&str>) -> Option<String> {
        let stored = self.session.access_token();
        (!stored.is_empty() && request_token != Some(stored.as_str())).then_some(stored)
    }

    fn logout(&self) {
        info!("Session rejected by the server, signing out");
        if let Err(e) = self.session.clear() {
            warn!("Failed to clear session: {}", e);
        }
        self.notifier.send(AppEvent::Logout);
    }
}

/// Pull the error code out of a 401 body.
pub fn extract_error_code(body: &[u8], token_type: TokenType) -> Option<String> {
    let json: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => {
            debug!("Unable to get error_code from 401 response");
            return None;
        }
    };

    if let Some(code) = json.get("error_code") {
        return value_to_string(code);
    }

    match token_type {
        TokenType::Jwt => json
            .get("detail")
            .or_else(|| json.get("developer_message"))
            .and_then(value_to_string),
        TokenType::Bearer => json
            .get("developer_message")
            .and_then(|m| m.get("error_code"))
            .and_then(value_to_string)
            .filter(|code| !code.is_empty()),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// The token part of an `Authorization` header value such as `JWT abc`.
pub fn token_from_header(value: &str) -> Option<&str> {
    value.split(' ').nth(1)
}
