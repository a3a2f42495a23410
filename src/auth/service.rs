use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{LmsApi, OAuthApi};
use crate::app::{AppEvent, CoursewareError, Notifier, Result};
use crate::auth::{validator, Session};
use crate::domain::User;

/// Sign-in and sign-out.
pub struct AuthService {
    oauth: Arc<dyn OAuthApi + Send + Sync>,
    api: Arc<dyn LmsApi + Send + Sync>,
    session: Arc<Session>,
    notifier: Notifier,
}

impl AuthService {
    pub fn new(
        oauth: Arc<dyn OAuthApi + Send + Sync>,
        api: Arc<dyn LmsApi + Send + Sync>,
        session: Arc<Session>,
        notifier: Notifier,
    ) -> Self {
        Self {
            oauth,
            api,
            session,
            notifier,
        }
    }

    /// Exchange credentials for a token pair and load the user's profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        validator::validate_credentials(username, password)?;

        let auth = self.oauth.password_grant(username.trim(), password).await?;
        if let Some(error) = auth.error.clone() {
            return Err(CoursewareError::Unknown(
                auth.error_description.unwrap_or(error),
            ));
        }
        let tokens = auth
            .token_pair()
            .ok_or_else(|| CoursewareError::Unknown("Incomplete token response".to_string()))?;
        self.session.set_tokens(tokens)?;

        let user = self.api.profile().await?;
        self.session.set_user(user.clone())?;
        info!("Signed in as {}", user.username);

        self.notifier.send(AppEvent::SignedIn {
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// Revoke the refresh token if possible, then forget the session.
    pub async fn logout(&self) -> Result<()> {
        let refresh_token = self.session.refresh_token();
        if !refresh_token.is_empty() {
            if let Err(e) = self.oauth.revoke(&refresh_token).await {
                warn!("Failed to revoke refresh token: {}", e);
            }
        }

        self.session.clear()?;
        self.notifier.send(AppEvent::Logout);
        info!("Signed out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthResponse, RefreshResult};
    use crate::domain::{CourseStatus, CourseStructure, EnrolledCourse, TokenPair};
    use crate::store::{SqliteStore, Store};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeOAuth {
        grants: AtomicUsize,
        revokes: AtomicUsize,
        response: AuthResponse,
    }

    #[async_trait]
    impl OAuthApi for FakeOAuth {
        async fn password_grant(&self, _: &str, _: &str) -> Result<AuthResponse> {
            self.grants.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        async fn refresh(&self, _: &str) -> Result<RefreshResult> {
            Ok(RefreshResult::Failed)
        }

        async fn revoke(&self, _: &str) -> Result<()> {
            self.revokes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeLms;

    #[async_trait]
    impl LmsApi for FakeLms {
        async fn profile(&self) -> Result<User> {
            Ok(User {
                id: 7,
                username: "staff".into(),
                email: "staff@example.com".into(),
                name: "Staff".into(),
            })
        }

        async fn enrolled_courses(&self, _: &str) -> Result<Vec<EnrolledCourse>> {
            Ok(Vec::new())
        }

        async fn course_structure(&self, _: &str, course_id: &str) -> Result<CourseStructure> {
            Err(CoursewareError::CourseNotFound(course_id.to_string()))
        }

        async fn course_status(&self, _: &str, _: &str) -> Result<CourseStatus> {
            Ok(CourseStatus::default())
        }

        async fn mark_blocks_completion(&self, _: &str, _: &str, _: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn service(oauth: Arc<FakeOAuth>) -> (AuthService, Arc<Session>, Notifier) {
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory().unwrap());
        let session = Arc::new(Session::load(store).unwrap());
        let notifier = Notifier::new();
        let service = AuthService::new(oauth, Arc::new(FakeLms), session.clone(), notifier.clone());
        (service, session, notifier)
    }

    #[tokio::test]
    async fn test_invalid_email_never_hits_network() {
        let oauth = Arc::new(FakeOAuth::default());
        let (service, _, _) = service(oauth.clone());

        let err = service.login("not-an-email@", "secret").await.unwrap_err();

        assert!(matches!(err, CoursewareError::Validation(_)));
        assert_eq!(oauth.grants.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_password_never_hits_network() {
        let oauth = Arc::new(FakeOAuth::default());
        let (service, _, _) = service(oauth.clone());

        assert!(service.login("staff", "").await.is_err());
        assert_eq!(oauth.grants.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_user() {
        let oauth = Arc::new(FakeOAuth {
            response: AuthResponse {
                access_token: Some("a".into()),
                refresh_token: Some("r".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        let (service, session, notifier) = service(oauth);
        let mut rx = notifier.subscribe();

        let user = service.login("staff@example.com", "edx").await.unwrap();

        assert_eq!(user.username, "staff");
        assert_eq!(session.access_token(), "a");
        assert_eq!(service.current_user().unwrap().id, 7);
        assert_eq!(
            rx.recv().await.unwrap(),
            AppEvent::SignedIn {
                username: "staff".into()
            }
        );
    }

    #[tokio::test]
    async fn test_error_field_maps_to_unknown() {
        let oauth = Arc::new(FakeOAuth {
            response: AuthResponse {
                error: Some("rate_limited".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        let (service, session, _) = service(oauth);

        let err = service.login("staff", "edx").await.unwrap_err();
        assert!(matches!(err, CoursewareError::Unknown(_)));
        assert!(!session.is_signed_in());
    }

    #[tokio::test]
    async fn test_logout_revokes_and_clears() {
        let oauth = Arc::new(FakeOAuth::default());
        let (service, session, notifier) = service(oauth.clone());
        session.set_tokens(TokenPair::new("a", "r")).unwrap();
        let mut rx = notifier.subscribe();

        service.logout().await.unwrap();

        assert_eq!(oauth.revokes.load(Ordering::SeqCst), 1);
        assert!(!session.is_signed_in());
        assert_eq!(rx.recv().await.unwrap(), AppEvent::Logout);
    }
}
