use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// The signed-in user's API credential, shared read-only by every relay hop.
///
/// Login and logout (out of scope here) are the only writers.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self.current().is_some();
        f.debug_struct("CredentialStore")
            .field("credential", if present { &"[REDACTED]" } else { &"[empty]" })
            .finish()
    }
}

impl CredentialStore {
    pub fn new(credential: Option<String>) -> Self {
        let store = Self::default();
        if let Some(credential) = credential {
            store.set(credential);
        }
        store
    }

    /// Store a credential; blank values clear it.
    pub fn set(&self, credential: impl Into<String>) {
        let credential = credential.into();
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = if credential.trim().is_empty() {
            None
        } else {
            Some(credential)
        };
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn current(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
