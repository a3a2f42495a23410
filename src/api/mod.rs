pub mod client;
pub mod models;
pub mod oauth;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::{CourseStatus, CourseStructure, EnrolledCourse, TokenPair, User};

pub use client::ApiClient;
pub use models::AuthResponse;
pub use oauth::OAuthClient;

pub const URL_ACCESS_TOKEN: &str = "/oauth2/access_token/";
pub const URL_REVOKE_TOKEN: &str = "/oauth2/revoke_token/";
pub const URL_MY_USER_INFO: &str = "/api/mobile/v0.5/my_user_info";
pub const URL_COMPLETION_BATCH: &str = "/api/completion/v1/completion-batch";

/// Outcome of exchanging a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshResult {
    Refreshed(TokenPair),
    /// HTTP 400: the refresh token was already used, typically by a
    /// concurrent refresh that has not been observed yet.
    InProgress,
    Failed,
}

/// Token endpoint operations. These never go through the authenticator.
#[async_trait]
pub trait OAuthApi {
    async fn password_grant(&self, username: &str, password: &str) -> Result<AuthResponse>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult>;

    async fn revoke(&self, refresh_token: &str) -> Result<()>;
}

/// Authenticated LMS endpoints.
#[async_trait]
pub trait LmsApi {
    async fn profile(&self) -> Result<User>;

    async fn enrolled_courses(&self, username: &str) -> Result<Vec<EnrolledCourse>>;

    async fn course_structure(&self, username: &str, course_id: &str) -> Result<CourseStructure>;

    async fn course_status(&self, username: &str, course_id: &str) -> Result<CourseStatus>;

    async fn mark_blocks_completion(
        &self,
        username: &str,
        course_id: &str,
        block_ids: &[String],
    ) -> Result<()>;
}
