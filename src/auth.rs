//! `Authenticator`: the identity collaborator invoked as pre-engine
//! middleware.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Caller identity resolved by an [`Authenticator`]. `tenant_id`, when
/// present, scopes every `ResponseStore` operation for the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub service_tier: Option<String>,
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), service_tier: None, scopes: Vec::new(), tenant_id: None, metadata: HashMap::new() }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Outcome of one authenticator in the chain. `Abstain` lets the next
/// authenticator decide; a chain of all-`Abstain` falls back to a
/// configurable default.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    Yes(Identity),
    No,
    Abstain,
}

/// A single evaluator in the authentication chain. `raw_authorization` is the
/// verbatim `Authorization` header value, if present.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, raw_authorization: Option<&str>) -> Result<AuthDecision>;
}

/// Evaluates a chain of authenticators in order; the first `Yes` or `No`
/// stops evaluation. `default_reject` governs the all-`Abstain` outcome.
pub async fn authenticate_chain(
    chain: &[std::sync::Arc<dyn Authenticator>],
    raw_authorization: Option<&str>,
    default_reject: bool,
) -> Result<Option<Identity>> {
    for authenticator in chain {
        match authenticator.authenticate(raw_authorization).await? {
            AuthDecision::Yes(identity) => return Ok(Some(identity)),
            AuthDecision::No => return Ok(None),
            AuthDecision::Abstain => continue,
        }
    }
    Ok(if default_reject { None } else { Some(Identity::new("anonymous")) })
}

/// Test-only fixture: accepts exactly one configured bearer token.
pub struct StaticTokenAuthenticator {
    token: String,
    identity: Identity,
}

impl StaticTokenAuthenticator {
    pub fn new(token: impl Into<String>, identity: Identity) -> Self {
        Self { token: token.into(), identity }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, raw_authorization: Option<&str>) -> Result<AuthDecision> {
        let Some(header) = raw_authorization else { return Ok(AuthDecision::Abstain) };
        let presented = header.strip_prefix("Bearer ").unwrap_or(header);
        if presented == self.token {
            Ok(AuthDecision::Yes(self.identity.clone()))
        } else {
            Ok(AuthDecision::No)
        }
    }
}
