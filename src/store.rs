//! `ResponseStore`: the persistence collaborator.
//!
//! Only the contract is fixed; this crate ships no production backend.
//! [`InMemoryResponseStore`] exists purely to back integration tests and
//! is not meant to back a real deployment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::protocol::{Item, Response};

#[derive(Debug, Clone, Default)]
pub struct ListResponsesOptions {
    pub before: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
    pub order_desc: bool,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}

/// Persistence contract. All operations are scoped by
/// `tenant_id` when the caller's [`crate::auth::Identity`] carries one.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn save_response(&self, tenant_id: Option<&str>, response: Response, input_items: Vec<Item>) -> Result<()>;

    /// Excludes soft-deleted responses.
    async fn get_response(&self, tenant_id: Option<&str>, id: &str) -> Result<Response>;

    /// Includes soft-deleted responses, so `previous_response_id` chains
    /// never break when an intermediate has been deleted.
    async fn get_response_for_chain(&self, tenant_id: Option<&str>, id: &str) -> Result<Response>;

    async fn delete_response(&self, tenant_id: Option<&str>, id: &str) -> Result<Response>;

    async fn list_responses(&self, tenant_id: Option<&str>, opts: ListResponsesOptions) -> Result<Page<Response>>;

    async fn get_input_items(&self, tenant_id: Option<&str>, response_id: &str, opts: ListResponsesOptions) -> Result<Page<Item>>;

    async fn health_check(&self) -> Result<()>;

    async fn close(&self);
}

/// Keeps only entries whose id sorts strictly after `after` and/or strictly
/// before `before`, applied post-sort so the cursors are relative to the
/// page's current order rather than insertion order.
fn apply_cursor<T>(mut data: Vec<T>, after: Option<&str>, before: Option<&str>, id_of: impl Fn(&T) -> &str) -> Vec<T> {
    if let Some(after) = after {
        data.retain(|item| id_of(item) > after);
    }
    if let Some(before) = before {
        data.retain(|item| id_of(item) < before);
    }
    data
}

#[derive(Clone)]
struct StoredResponse {
    response: Response,
    input_items: Vec<Item>,
    tenant_id: Option<String>,
}

/// Test-only fixture. Guarded by a single `RwLock` since it exists only to
/// exercise the contract in integration tests, not to model real concurrency
/// control.
#[derive(Default)]
pub struct InMemoryResponseStore {
    responses: Arc<RwLock<HashMap<String, StoredResponse>>>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_tenant(stored: &StoredResponse, tenant_id: Option<&str>) -> Result<()> {
        if stored.tenant_id.as_deref() != tenant_id {
            return Err(GatewayError::not_found("response not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn save_response(&self, tenant_id: Option<&str>, response: Response, input_items: Vec<Item>) -> Result<()> {
        let mut guard = self.responses.write().await;
        guard.insert(
            response.id.clone(),
            StoredResponse { response, input_items, tenant_id: tenant_id.map(str::to_string) },
        );
        Ok(())
    }

    async fn get_response(&self, tenant_id: Option<&str>, id: &str) -> Result<Response> {
        let guard = self.responses.read().await;
        let stored = guard.get(id).ok_or_else(|| GatewayError::not_found(format!("response '{id}' not found")))?;
        Self::check_tenant(stored, tenant_id)?;
        if stored.response.deleted {
            return Err(GatewayError::not_found(format!("response '{id}' not found")));
        }
        Ok(stored.response.clone())
    }

    async fn get_response_for_chain(&self, tenant_id: Option<&str>, id: &str) -> Result<Response> {
        let guard = self.responses.read().await;
        let stored = guard.get(id).ok_or_else(|| GatewayError::not_found(format!("response '{id}' not found")))?;
        Self::check_tenant(stored, tenant_id)?;
        Ok(stored.response.clone())
    }

    async fn delete_response(&self, tenant_id: Option<&str>, id: &str) -> Result<Response> {
        let mut guard = self.responses.write().await;
        let stored = guard.get_mut(id).ok_or_else(|| GatewayError::not_found(format!("response '{id}' not found")))?;
        Self::check_tenant(stored, tenant_id)?;
        stored.response.deleted = true;
        Ok(stored.response.clone())
    }

    async fn list_responses(&self, tenant_id: Option<&str>, opts: ListResponsesOptions) -> Result<Page<Response>> {
        let guard = self.responses.read().await;
        let mut data: Vec<Response> = guard
            .values()
            .filter(|stored| stored.tenant_id.as_deref() == tenant_id && !stored.response.deleted)
            .map(|stored| stored.response.clone())
            .collect();
        data.sort_by_key(|r| r.created_at);
        if opts.order_desc {
            data.reverse();
        }
        let mut data = apply_cursor(data, opts.after.as_deref(), opts.before.as_deref(), |r| r.id.as_str());
        let limit = opts.limit.unwrap_or(20).min(100) as usize;
        let has_more = data.len() > limit;
        data.truncate(limit);
        let first_id = data.first().map(|r| r.id.clone());
        let last_id = data.last().map(|r| r.id.clone());
        Ok(Page { data, has_more, first_id, last_id })
    }

    async fn get_input_items(&self, tenant_id: Option<&str>, response_id: &str, opts: ListResponsesOptions) -> Result<Page<Item>> {
        let guard = self.responses.read().await;
        let stored = guard
            .get(response_id)
            .ok_or_else(|| GatewayError::not_found(format!("response '{response_id}' not found")))?;
        Self::check_tenant(stored, tenant_id)?;
        let mut data = stored.input_items.clone();
        if opts.order_desc {
            data.reverse();
        }
        let mut data = apply_cursor(data, opts.after.as_deref(), opts.before.as_deref(), |i| i.id());
        let limit = opts.limit.unwrap_or(20).min(100) as usize;
        let has_more = data.len() > limit;
        data.truncate(limit);
        let first_id = data.first().map(|i| i.id().to_string());
        let last_id = data.last().map(|i| i.id().to_string());
        Ok(Page { data, has_more, first_id, last_id })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
