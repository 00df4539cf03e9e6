//! # REST Transport
//!
//! The reqwest-backed client for the backend API, and the trait seams that
//! let tests swap it for deterministic fakes.
//!
//! ## Boundary Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Transport Boundary                                │
//! │                                                                         │
//! │  reqwest outcome                FetchFailure                           │
//! │  ───────────────                ────────────                           │
//! │  timeout                   ──►  Timeout(detail)                        │
//! │  connect/DNS/transport err ──►  Network(detail)                        │
//! │  non-2xx status            ──►  Status { code, body prefix }           │
//! │  envelope mismatch         ──►  Decode(detail)                         │
//! │                                                                         │
//! │  Raw bodies and io messages are logged here (tracing) and carried in   │
//! │  FetchFailure for diagnostics; classification into the surfaced        │
//! │  taxonomy happens above this layer. Timeouts themselves are reqwest's  │
//! │  job - this layer sets the client-wide deadline and nothing else.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use atrium_core::{FetchFailure, PageInfo, QueryParams, ResourceData, UserRecord};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::protocol::{
    EntityEnvelope, ListEnvelope, LoginRequest, MutationRequest, MutationVerb, RefreshRequest,
    RegisterRequest, SessionGrant,
};

/// How much of an error body is kept for diagnostics.
const DETAIL_LIMIT: usize = 512;

// =============================================================================
// API Seams
// =============================================================================

/// Read/write access to resource endpoints.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Fetches one view of a resource: a filtered collection, or a single
    /// entity when `params` carries an entity id.
    async fn fetch(
        &self,
        resource: &str,
        params: &QueryParams,
        access_token: &str,
    ) -> Result<(ResourceData, Option<PageInfo>), FetchFailure>;

    /// Performs a write. Returns the written record when the backend sends
    /// one back (creates/updates), None for bodyless outcomes (deletes).
    async fn mutate(
        &self,
        request: &MutationRequest,
        access_token: &str,
    ) -> Result<Option<Value>, FetchFailure>;
}

/// The authentication endpoint family.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<SessionGrant, FetchFailure>;

    async fn register(&self, request: &RegisterRequest) -> Result<SessionGrant, FetchFailure>;

    /// Trades a refresh credential for a fresh access+refresh pair.
    async fn refresh(&self, refresh_token: &str) -> Result<SessionGrant, FetchFailure>;

    /// Remote session invalidation. Best effort - callers clear local state
    /// regardless of this outcome.
    async fn logout(&self, access_token: &str) -> Result<(), FetchFailure>;

    /// The user the backend currently associates with the credential.
    async fn current_user(&self, access_token: &str) -> Result<UserRecord, FetchFailure>;
}

// =============================================================================
// REST Transport
// =============================================================================

/// reqwest-backed implementation of both API seams.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl RestTransport {
    /// Builds a transport from the store configuration.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api.request_timeout())
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        Ok(RestTransport {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Maps a reqwest error into the raw failure shape.
    fn request_failure(err: reqwest::Error) -> FetchFailure {
        if err.is_timeout() {
            FetchFailure::Timeout(err.to_string())
        } else {
            FetchFailure::Network(err.to_string())
        }
    }

    /// Gates on the response status, draining the body into diagnostic
    /// detail on failure.
    async fn read_success_body(response: reqwest::Response) -> Result<String, FetchFailure> {
        let status = response.status();
        let body = response.text().await.map_err(Self::request_failure)?;
        if status.is_success() {
            Ok(body)
        } else {
            let detail = truncate_detail(&body);
            warn!(status = status.as_u16(), body = %detail, "Backend returned error status");
            Err(FetchFailure::Status {
                code: status.as_u16(),
                detail,
            })
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, FetchFailure> {
        serde_json::from_str(body).map_err(|e| {
            warn!(error = %e, "Response did not match the expected envelope");
            FetchFailure::Decode(e.to_string())
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
        access_token: &str,
    ) -> Result<T, FetchFailure> {
        let mut request = self.client.get(self.url(path)).bearer_auth(access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await.map_err(Self::request_failure)?;
        let body = Self::read_success_body(response).await?;
        Self::decode(&body)
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, FetchFailure> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(Self::request_failure)?;
        let body = Self::read_success_body(response).await?;
        Self::decode(&body)
    }
}

#[async_trait]
impl ResourceApi for RestTransport {
    async fn fetch(
        &self,
        resource: &str,
        params: &QueryParams,
        access_token: &str,
    ) -> Result<(ResourceData, Option<PageInfo>), FetchFailure> {
        if let Some(entity) = &params.entity {
            let path = format!("{}/{}", resource, entity);
            debug!(%path, "GET entity");
            let envelope: EntityEnvelope = self.get_json(&path, &[], access_token).await?;
            Ok((ResourceData::single(envelope.data), None))
        } else {
            debug!(%resource, "GET collection");
            let envelope: ListEnvelope = self
                .get_json(resource, &params.query_pairs(), access_token)
                .await?;
            Ok((
                ResourceData::collection(envelope.data),
                Some(envelope.meta),
            ))
        }
    }

    async fn mutate(
        &self,
        request: &MutationRequest,
        access_token: &str,
    ) -> Result<Option<Value>, FetchFailure> {
        let url = self.url(&request.path());
        debug!(verb = %request.verb, %url, "Mutation");

        let mut builder = match request.verb {
            MutationVerb::Post => self.client.post(&url),
            MutationVerb::Put => self.client.put(&url),
            MutationVerb::Patch => self.client.patch(&url),
            MutationVerb::Delete => self.client.delete(&url),
        }
        .bearer_auth(access_token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Self::request_failure)?;
        let body = Self::read_success_body(response).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let envelope: EntityEnvelope = Self::decode(&body)?;
        Ok(Some(envelope.data))
    }
}

#[async_trait]
impl AuthApi for RestTransport {
    async fn login(&self, request: &LoginRequest) -> Result<SessionGrant, FetchFailure> {
        self.post_json("auth/login", request).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<SessionGrant, FetchFailure> {
        self.post_json("auth/register", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionGrant, FetchFailure> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post_json("auth/refresh", &request).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), FetchFailure> {
        let response = self
            .client
            .post(self.url("auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(Self::request_failure)?;
        Self::read_success_body(response).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<UserRecord, FetchFailure> {
        let envelope: EntityEnvelope = self.get_json("auth/me", &[], access_token).await?;
        serde_json::from_value(envelope.data)
            .map_err(|e| FetchFailure::Decode(e.to_string()))
    }
}

fn truncate_detail(body: &str) -> String {
    if body.len() <= DETAIL_LIMIT {
        return body.to_string();
    }
    let mut end = DETAIL_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
