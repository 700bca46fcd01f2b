use std::sync::Arc;

use crate::auth::SessionVerifier;
use crate::config::Config;
use crate::store::Store;

/// Per-request handles. Cloned into every handler; holds no mutable state
/// of its own.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionVerifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            store,
            sessions: Arc::new(SessionVerifier::new(
                &config.jwt_secret,
                &config.jwt_audience,
                config.session_cookie.clone(),
            )),
        }
    }
}
