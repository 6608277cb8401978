//! Shared state handed to every axum handler.

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::engine::Engine;
use crate::registry::InFlightRegistry;
use crate::store::ResponseStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Option<Arc<dyn ResponseStore>>,
    pub in_flight: InFlightRegistry,
    pub authenticators: Arc<Vec<Arc<dyn Authenticator>>>,
    /// Whether an all-`Abstain` authenticator chain rejects (production) or
    /// admits an anonymous identity (local/dev).
    pub default_reject: bool,
    pub max_body_bytes: usize,
}
