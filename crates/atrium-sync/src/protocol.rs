//! # Wire Types
//!
//! Request and response shapes exchanged with the REST backend.
//!
//! ## Endpoint Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Backend Contract                                 │
//! │                                                                         │
//! │  RESOURCE READS                                                        │
//! │  ──────────────                                                        │
//! │  GET /api/v1/{resource}?f=v&page=N  ◄── ListEnvelope                   │
//! │      { "data": [ ... ], "meta": { "page", "per_page", "total" } }      │
//! │  GET /api/v1/{resource}/{id}        ◄── EntityEnvelope                 │
//! │      { "data": { ... } }                                               │
//! │                                                                         │
//! │  RESOURCE WRITES                                                       │
//! │  ───────────────                                                       │
//! │  POST/PUT/PATCH/DELETE /api/v1/{resource}[/{id}]                       │
//! │                                                                         │
//! │  AUTH FAMILY                                                           │
//! │  ───────────                                                           │
//! │  POST /api/v1/auth/login     { email, password }   ◄── SessionGrant    │
//! │  POST /api/v1/auth/register  { email, password, …} ◄── SessionGrant    │
//! │  POST /api/v1/auth/refresh   { refresh_token }     ◄── SessionGrant    │
//! │  POST /api/v1/auth/logout    (bearer)                                  │
//! │  GET  /api/v1/auth/me        (bearer)              ◄── EntityEnvelope  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly these shapes are validated at the boundary. A response that
//! deserializes into none of them is a broken contract and classifies as
//! ServerError - the transport never falls back to guessing alternate
//! shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use atrium_core::{AuthSession, PageInfo, UserRecord};

// =============================================================================
// Response Envelopes
// =============================================================================

/// Collection response: records plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEnvelope {
    /// The matching records for the requested page.
    pub data: Vec<Value>,

    /// Pagination metadata.
    pub meta: PageInfo,
}

/// Single-entity response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEnvelope {
    /// The record.
    pub data: Value,
}

// =============================================================================
// Auth Requests
// =============================================================================

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload for `POST /auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Payload for `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// =============================================================================
// Session Grant
// =============================================================================

/// Successful outcome of login, registration, or refresh: a fresh credential
/// pair plus the user it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    /// Bearer credential for subsequent requests.
    pub access_token: String,

    /// Credential for the next refresh exchange.
    pub refresh_token: String,

    /// Access token expiry.
    pub expires_at: DateTime<Utc>,

    /// Server-assigned session identity.
    pub session_id: Uuid,

    /// The authenticated user.
    pub user: UserRecord,
}

impl SessionGrant {
    /// Splits the grant into the session credential set and the user record.
    pub fn into_parts(self) -> (AuthSession, UserRecord) {
        let session = AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            session_id: self.session_id,
        };
        (session, self.user)
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// HTTP verb for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationVerb {
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for MutationVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationVerb::Post => write!(f, "POST"),
            MutationVerb::Put => write!(f, "PUT"),
            MutationVerb::Patch => write!(f, "PATCH"),
            MutationVerb::Delete => write!(f, "DELETE"),
        }
    }
}

/// A write against a resource.
///
/// On success the store invalidates every cached view of the resource; the
/// next load reflects the change. No optimistic merge happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Resource type being written (`orders`, `users`, ...).
    pub resource: String,

    /// Entity id for targeted writes (`PUT orders/42`). None for
    /// collection-level writes (`POST orders`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// HTTP verb.
    pub verb: MutationVerb,

    /// JSON body. None for bodyless writes (DELETE).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl MutationRequest {
    /// Creates a collection-level POST.
    pub fn create(resource: impl Into<String>, body: Value) -> Self {
        MutationRequest {
            resource: resource.into(),
            entity: None,
            verb: MutationVerb::Post,
            body: Some(body),
        }
    }

    /// Creates an entity-level PUT.
    pub fn update(resource: impl Into<String>, entity: impl Into<String>, body: Value) -> Self {
        MutationRequest {
            resource: resource.into(),
            entity: Some(entity.into()),
            verb: MutationVerb::Put,
            body: Some(body),
        }
    }

    /// Creates an entity-level DELETE.
    pub fn delete(resource: impl Into<String>, entity: impl Into<String>) -> Self {
        MutationRequest {
            resource: resource.into(),
            entity: Some(entity.into()),
            verb: MutationVerb::Delete,
            body: None,
        }
    }

    /// Path under the API root (`orders` or `orders/42`).
    pub fn path(&self) -> String {
        match &self.entity {
            Some(entity) => format!("{}/{}", self.resource, entity),
            None => self.resource.clone(),
        }
    }
}
