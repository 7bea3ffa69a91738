use std::sync::{Arc, PoisonError, RwLock};

/// Access token shared between the session store (writer) and the HTTP
/// adapter (reader).
#[derive(Clone, Debug, Default)]
pub struct SessionTokens {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn clear(&self) {
        self.set(None);
    }
}
