//! Storage seam for the engine
//!
//! The engine only needs to look up and persist contexts, so it sees the
//! store through this trait and tests can substitute their own.

use crate::context::Context;
use crate::index::IndexKey;
use crate::store::{ContextStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for conversation contexts
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// The active context for `(rule_name, key)`, if any
    async fn find_active(&self, rule_name: &str, key: &IndexKey) -> Result<Option<Context>, StoreError>;

    /// Create or overwrite `context`, returning it with its id assigned
    async fn save(&self, context: Context) -> Result<Context, StoreError>;
}

#[async_trait]
impl ContextRepository for ContextStore {
    async fn find_active(&self, rule_name: &str, key: &IndexKey) -> Result<Option<Context>, StoreError> {
        Ok(ContextStore::find_active(self, rule_name, key))
    }

    async fn save(&self, context: Context) -> Result<Context, StoreError> {
        ContextStore::save(self, context)
    }
}

// ============================================================================
// Arc implementation
// ============================================================================

#[async_trait]
impl<T: ContextRepository + ?Sized> ContextRepository for Arc<T> {
    async fn find_active(&self, rule_name: &str, key: &IndexKey) -> Result<Option<Context>, StoreError> {
        (**self).find_active(rule_name, key).await
    }

    async fn save(&self, context: Context) -> Result<Context, StoreError> {
        (**self).save(context).await
    }
}
