//! Session collaborator: who the dashboard is showing

use std::sync::{PoisonError, RwLock};

/// Supplies the current subject id, if anyone is signed in
pub trait SessionProvider: Send + Sync {
    fn subject_id(&self) -> Option<String>;
}

/// Session backed by a settable value
#[derive(Debug, Default)]
pub struct StaticSession {
    subject_id: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn new(subject_id: Option<String>) -> Self {
        Self {
            subject_id: RwLock::new(subject_id),
        }
    }

    pub fn signed_in(subject_id: impl Into<String>) -> Self {
        Self::new(Some(subject_id.into()))
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    /// Change the subject; call `MoodUpdates::sync_identity` afterwards
    pub fn set_subject_id(&self, subject_id: Option<String>) {
        *self
            .subject_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = subject_id;
    }
}

impl SessionProvider for StaticSession {
    fn subject_id(&self) -> Option<String> {
        self.subject_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_session() {
        let session = StaticSession::signed_in("user-42");
        assert_eq!(session.subject_id().as_deref(), Some("user-42"));

        session.set_subject_id(Some("user-7".to_string()));
        assert_eq!(session.subject_id().as_deref(), Some("user-7"));

        session.set_subject_id(None);
        assert_eq!(session.subject_id(), None);
    }

    #[test]
    fn test_blank_subject_counts_as_signed_out() {
        let session = StaticSession::new(Some("  ".to_string()));
        assert_eq!(session.subject_id(), None);
        assert_eq!(StaticSession::signed_out().subject_id(), None);
    }
}
