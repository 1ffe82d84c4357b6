use async_trait::async_trait;
use log::info;
use std::sync::RwLock;

/// Source of the bearer credential attached to backend requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn is_signed_in(&self) -> bool;
    async fn get_token(&self) -> Option<String>;
}

/// Holds the token handed over by the identity provider after sign-in.
#[derive(Debug, Default)]
pub struct BearerToken {
    token: RwLock<Option<String>>,
}

impl BearerToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.is_empty())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
            info!("Bearer token set");
        }
    }

    pub fn clear_token(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
            info!("Bearer token cleared");
        }
    }
}

#[async_trait]
impl AuthProvider for BearerToken {
    fn is_signed_in(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    async fn get_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }
}
