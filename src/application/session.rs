//! The signed-in user, as a single explicit context.
//!
//! Components that need the user id or token receive it from
//! [`SessionContext`] instead of reading stored state on their own.

use crate::domain::AuthGrant;
use crate::infrastructure::{Backend, SessionStore};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    usuario_id: u64,
    token: String,
}

impl Session {
    pub fn from_grant(grant: AuthGrant) -> Self {
        Self {
            usuario_id: grant.usuario_id,
            token: grant.token,
        }
    }

    pub fn usuario_id(&self) -> u64 {
        self.usuario_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn grant(&self) -> AuthGrant {
        AuthGrant {
            token: self.token.clone(),
            usuario_id: self.usuario_id,
        }
    }
}

/// Owns the session lifecycle: restore on start, begin on login, teardown
/// on logout. Every transition keeps the store and the backend's bearer
/// token in step with `current`.
pub struct SessionContext {
    store: Option<SessionStore>,
    current: Option<Session>,
}

impl SessionContext {
    /// `store` is `None` when the session should not outlive the process.
    pub fn new(store: Option<SessionStore>) -> Self {
        Self { store, current: None }
    }

    /// Restores a stored session, if any, and authorizes the backend with it.
    pub fn init(&mut self, backend: &dyn Backend) -> Option<&Session> {
        self.current = self
            .store
            .as_ref()
            .and_then(SessionStore::load)
            .map(Session::from_grant);
        backend.authorize(self.current.as_ref().map(|s| s.token.clone()));
        if let Some(session) = &self.current {
            info!(usuario_id = session.usuario_id, "restored session");
        }
        self.current.as_ref()
    }

    pub fn begin(&mut self, grant: AuthGrant, backend: &dyn Backend) -> &Session {
        let session = Session::from_grant(grant);
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session.grant()) {
                warn!(error = %e, "could not persist session");
            }
        }
        backend.authorize(Some(session.token.clone()));
        info!(usuario_id = session.usuario_id, "signed in");
        self.current.insert(session)
    }

    pub fn teardown(&mut self, backend: &dyn Backend) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "could not remove stored session");
            }
        }
        backend.authorize(None);
        if let Some(session) = self.current.take() {
            info!(usuario_id = session.usuario_id, "signed out");
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn usuario_id(&self) -> Option<u64> {
        self.current.as_ref().map(Session::usuario_id)
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::RecordingBackend;
    use tempfile::TempDir;

    fn grant() -> AuthGrant {
        AuthGrant { token: "tok-1".to_string(), usuario_id: 7 }
    }

    #[test]
    fn test_begin_persists_and_authorizes() {
        let dir = TempDir::new().unwrap();
        let backend = RecordingBackend::default();
        let mut context = SessionContext::new(Some(SessionStore::new(dir.path().join("session.json"))));

        assert!(context.init(&backend).is_none());
        assert_eq!(backend.token(), None);

        context.begin(grant(), &backend);
        assert_eq!(context.usuario_id(), Some(7));
        assert_eq!(backend.token(), Some("tok-1".to_string()));

        let mut restored = SessionContext::new(Some(SessionStore::new(dir.path().join("session.json"))));
        let other_backend = RecordingBackend::default();
        assert_eq!(restored.init(&other_backend).map(Session::token), Some("tok-1"));
        assert_eq!(other_backend.token(), Some("tok-1".to_string()));
    }

    #[test]
    fn test_teardown_clears_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let backend = RecordingBackend::default();
        let mut context = SessionContext::new(Some(SessionStore::new(&path)));
        context.begin(grant(), &backend);

        context.teardown(&backend);
        assert!(!context.is_active());
        assert_eq!(backend.token(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_ephemeral_session() {
        let backend = RecordingBackend::default();
        let mut context = SessionContext::new(None);
        assert!(context.init(&backend).is_none());
        context.begin(grant(), &backend);
        assert_eq!(context.current().map(Session::usuario_id), Some(7));
    }
}
