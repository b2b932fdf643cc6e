use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::store::SocialStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SocialStore>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(store: Arc<dyn SocialStore>, tokens: TokenKeys) -> Self {
        Self {
            store,
            tokens: Arc::new(tokens),
        }
    }

    pub fn store(&self) -> &dyn SocialStore {
        self.store.as_ref()
    }
}
