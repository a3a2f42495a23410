use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::api::models::AuthResponse;
use crate::api::{OAuthApi, RefreshResult, URL_ACCESS_TOKEN, URL_REVOKE_TOKEN};
use crate::app::{CoursewareError, Result};
use crate::config::{Config, TokenType};

const GRANT_TYPE_PASSWORD: &str = "password";
const GRANT_TYPE_REFRESH: &str = "refresh_token";

/// Talks to the OAuth2 token endpoints with its own plain HTTP client.
pub struct OAuthClient {
    client: Client,
    base_url: Url,
    client_id: String,
    token_type: TokenType,
}

impl OAuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("courseware/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.api_host_url)?,
            client_id: config.oauth_client_id.clone(),
            token_type: config.token_type,
        })
    }

    fn token_type_field(&self) -> String {
        self.token_type.as_str().to_lowercase()
    }
}

/// Map a rejected password grant to a named error.
fn login_error(status: StatusCode, body: &[u8]) -> CoursewareError {
    let parsed: AuthResponse = serde_json::from_slice(body).unwrap_or_default();
    match parsed.error.as_deref() {
        Some("invalid_grant") => CoursewareError::InvalidGrant,
        Some("user_not_active") | Some("inactive_user") => CoursewareError::UserNotActive,
        Some(other) => {
            CoursewareError::Unknown(parsed.error_description.unwrap_or_else(|| other.to_string()))
        }
        None => CoursewareError::Api {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[async_trait]
impl OAuthApi for OAuthClient {
    async fn password_grant(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let token_type = self.token_type_field();
        let form = [
            ("grant_type", GRANT_TYPE_PASSWORD),
            ("client_id", self.client_id.as_str()),
            ("username", username),
            ("password", password),
            ("token_type", token_type.as_str()),
            ("asymmetric_jwt", "true"),
        ];

        let response = self
            .client
            .post(self.base_url.join(URL_ACCESS_TOKEN)?)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(login_error(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult> {
        let token_type = self.token_type_field();
        let form = [
            ("grant_type", GRANT_TYPE_REFRESH),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("token_type", token_type.as_str()),
            ("asymmetric_jwt", "true"),
        ];

        let response = self
            .client
            .post(self.base_url.join(URL_ACCESS_TOKEN)?)
            .form(&form)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let auth: AuthResponse = response.json().await?;
                match auth.token_pair() {
                    Some(pair) => Ok(RefreshResult::Refreshed(pair)),
                    None => {
                        warn!("Refresh succeeded without a complete token pair");
                        Ok(RefreshResult::Failed)
                    }
                }
            }
            StatusCode::BAD_REQUEST => {
                debug!("Refresh rejected with 400, another refresh is likely in progress");
                Ok(RefreshResult::InProgress)
            }
            status => {
                warn!("Refresh failed with HTTP {}", status);
                Ok(RefreshResult::Failed)
            }
        }
    }

    async fn revoke(&self, refresh_token: &str) -> Result<()> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("token", refresh_token),
            ("token_type_hint", GRANT_TYPE_REFRESH),
        ];

        self.client
            .post(self.base_url.join(URL_REVOKE_TOKEN)?)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenPair;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OAuthClient {
        let config = Config {
            api_host_url: server.uri(),
            oauth_client_id: "mobile".into(),
            ..Default::default()
        };
        OAuthClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "token_type": "JWT",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).refresh("old-refresh").await.unwrap();
        assert_eq!(
            result,
            RefreshResult::Refreshed(TokenPair::new("new-access", "new-refresh"))
        );
    }

    #[tokio::test]
    async fn test_refresh_bad_request_is_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).refresh("used").await.unwrap();
        assert_eq!(result, RefreshResult::InProgress);
    }

    #[tokio::test]
    async fn test_refresh_server_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client_for(&server).refresh("r").await.unwrap();
        assert_eq!(result, RefreshResult::Failed);
    }

    #[tokio::test]
    async fn test_password_grant_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid credentials given."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .password_grant("staff", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, CoursewareError::InvalidGrant));
    }

    #[tokio::test]
    async fn test_password_grant_inactive_user() {
        for code in ["user_not_active", "inactive_user"] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(URL_ACCESS_TOKEN))
                .respond_with(
                    ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": code})),
                )
                .mount(&server)
                .await;

            let err = client_for(&server)
                .password_grant("staff", "edx")
                .await
                .unwrap_err();
            assert!(matches!(err, CoursewareError::UserNotActive), "{}: {:?}", code, err);
        }
    }

    #[tokio::test]
    async fn test_password_grant_other_error_uses_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "rate_limited",
                "error_description": "Slow down."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .password_grant("staff", "edx")
            .await
            .unwrap_err();
        assert!(matches!(err, CoursewareError::Unknown(ref m) if m == "Slow down."));
    }

    #[tokio::test]
    async fn test_password_grant_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(URL_ACCESS_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a",
                "refresh_token": "r"
            })))
            .mount(&server)
            .await;

        let auth = client_for(&server).password_grant("staff", "edx").await.unwrap();
        assert_eq!(auth.token_pair(), Some(TokenPair::new("a", "r")));
    }
}
