//! HTTP front end
//!
//! `POST /` feeds any JSON document to the engine and answers with the last
//! invoked step's response.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::engine::ProductionEngine;
use crate::store::ContextStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProductionEngine>,
    /// Read-only access for context inspection
    pub store: ContextStore,
}

impl AppState {
    pub fn new(engine: ProductionEngine, store: ContextStore) -> Self {
        Self {
            engine: Arc::new(engine),
            store,
        }
    }
}
