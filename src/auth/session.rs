use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::app::Result;
use crate::domain::{TokenPair, User};
use crate::store::Store;

/// Signed-in state: the current token pair and user, persisted through the store.
///
/// Reads are served from memory so the authenticator can compare tokens
/// without touching SQLite.
pub struct Session {
    store: Arc<dyn Store + Send + Sync>,
    tokens: RwLock<TokenPair>,
    user: RwLock<Option<User>>,
}

impl Session {
    pub fn load(store: Arc<dyn Store + Send + Sync>) -> Result<Self> {
        let tokens = store.load_tokens()?.unwrap_or_default();
        let user = store.load_user()?;
        Ok(Self {
            store,
            tokens: RwLock::new(tokens),
            user: RwLock::new(user),
        })
    }

    pub fn access_token(&self) -> String {
        read(&self.tokens).access_token.clone()
    }

    pub fn refresh_token(&self) -> String {
        read(&self.tokens).refresh_token.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        !self.access_token().is_empty()
    }

    /// Replace the token pair.
    ///
    /// Memory is updated before the store, so a failed write still leaves
    /// this process holding the pair the server just issued.
    pub fn set_tokens(&self, tokens: TokenPair) -> Result<()> {
        *write(&self.tokens) = tokens.clone();
        self.store.save_tokens(&tokens)?;
        debug!("Stored new token pair");
        Ok(())
    }

    /// Pick up a token pair another process wrote to the store.
    pub fn reload_tokens(&self) -> Result<()> {
        let tokens = self.store.load_tokens()?.unwrap_or_default();
        *write(&self.tokens) = tokens;
        Ok(())
    }

    pub fn user(&self) -> Option<User> {
        read(&self.user).clone()
    }

    pub fn username(&self) -> Option<String> {
        self.user().map(|u| u.username).filter(|u| !u.is_empty())
    }

    pub fn set_user(&self, user: User) -> Result<()> {
        self.store.save_user(&user)?;
        *write(&self.user) = Some(user);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        *write(&self.tokens) = TokenPair::default();
        *write(&self.user) = None;
        self.store.clear_session()?;
        Ok(())
    }
}

// The guarded values are plain data, so a panic elsewhere cannot leave
// them half-written.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::NamedTempFile;

    #[test]
    fn test_tokens_survive_reload() {
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory().unwrap());
        let session = Session::load(store.clone()).unwrap();
        assert!(!session.is_signed_in());

        session.set_tokens(TokenPair::new("a", "r")).unwrap();

        let reloaded = Session::load(store).unwrap();
        assert_eq!(reloaded.access_token(), "a");
        assert_eq!(reloaded.refresh_token(), "r");
    }

    #[test]
    fn test_clear_forgets_everything() {
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory().unwrap());
        let session = Session::load(store).unwrap();
        session.set_tokens(TokenPair::new("a", "r")).unwrap();
        session
            .set_user(User {
                username: "staff".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.username().as_deref(), Some("staff"));

        session.clear().unwrap();
        assert!(!session.is_signed_in());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_reload_picks_up_tokens_from_another_connection() {
        let db = NamedTempFile::new().unwrap();
        let first: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::new(db.path()).unwrap());
        let second: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::new(db.path()).unwrap());
        let session = Session::load(first).unwrap();
        session.set_tokens(TokenPair::new("old", "refresh")).unwrap();

        Session::load(second)
            .unwrap()
            .set_tokens(TokenPair::new("new", "refresh2"))
            .unwrap();
        assert_eq!(session.access_token(), "old");

        session.reload_tokens().unwrap();
        assert_eq!(session.access_token(), "new");
        assert_eq!(session.refresh_token(), "refresh2");
    }

    #[test]
    fn test_tokens_kept_in_memory_after_poisoned_lock() {
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory().unwrap());
        let session = Arc::new(Session::load(store.clone()).unwrap());

        let poisoner = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.tokens.write().unwrap();
            panic!("poison the token lock");
        })
        .join();

        session.set_tokens(TokenPair::new("a", "r")).unwrap();
        assert_eq!(session.refresh_token(), "r");
        assert_eq!(store.load_tokens().unwrap().unwrap().refresh_token, "r");
    }
}
