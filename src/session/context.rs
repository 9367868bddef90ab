//! Connection context and identity
//!
//! The streaming adapter builds a `ConnectionContext` from its transport and
//! asks a `NetworkContextValidator` for the caller's `Identity` once per
//! session or request. Core operations receive the validated `Identity`
//! explicitly.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::message::{HandlerId, RouterId};

/// Transport-level facts about a connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionContext {
    /// Remote peer address, if known
    pub peer_addr: Option<SocketAddr>,

    /// Bearer token presented by the peer
    pub token: Option<String>,

    /// Other transport metadata (headers)
    pub metadata: HashMap<String, String>,
}

impl ConnectionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peer address
    pub fn peer(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Set the bearer token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Role an authenticated peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Router,
    Handler,
}

/// Validated identity of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub role: Role,
    pub id: String,
}

impl Identity {
    /// Identity of a router
    pub fn router(id: impl Into<String>) -> Self {
        Self {
            role: Role::Router,
            id: id.into(),
        }
    }

    /// Identity of a handler
    pub fn handler(id: impl Into<String>) -> Self {
        Self {
            role: Role::Handler,
            id: id.into(),
        }
    }

    /// Router id, if this identity is a router
    pub fn router_id(&self) -> Option<RouterId> {
        match self.role {
            Role::Router => Some(RouterId::new(self.id.clone())),
            Role::Handler => None,
        }
    }

    /// Handler id, if this identity is a handler
    pub fn handler_id(&self) -> Option<HandlerId> {
        match self.role {
            Role::Handler => Some(HandlerId::new(self.id.clone())),
            Role::Router => None,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role {
            Role::Router => write!(f, "router:{}", self.id),
            Role::Handler => write!(f, "handler:{}", self.id),
        }
    }
}

/// Error type for connection validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials presented
    MissingToken,
    /// Credentials not recognized
    InvalidToken,
    /// No validator configured
    NoValidator,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing token"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::NoValidator => write!(f, "No network context validator configured"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Authenticates a connection and yields the caller's identity
pub trait NetworkContextValidator: Send + Sync + 'static {
    fn validate(&self, ctx: &ConnectionContext) -> Result<Identity, AuthError>;
}

/// Validator backed by a fixed token table
#[derive(Debug, Default, Clone)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl NetworkContextValidator for StaticTokenValidator {
    fn validate(&self, ctx: &ConnectionContext) -> Result<Identity, AuthError> {
        let token = ctx.token.as_deref().ok_or(AuthError::MissingToken)?;
        let identity = self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)?;

        tracing::debug!(
            identity = %identity,
            peer = ?ctx.peer_addr,
            "Connection authenticated"
        );
        Ok(identity)
    }
}
