use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::rate_limit::AdmissionError;
use crate::state::AppState;

/// Set by the auth layer in front of the gateway for signed-in callers.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Where caller identity may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// Socket peer only. Request headers are ignored.
    #[default]
    PeerAddress,
    /// `x-user-id`, then forwarded-for headers, then the peer. Only sound
    /// behind an auth proxy that overwrites these headers.
    TrustedHeaders,
}

/// Who a request is counted against.
///
/// Signed-in callers are counted by user id, everyone else by network
/// address. The two are namespaced so a user id never aliases an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Address(String),
}

impl Identity {
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn resolve(
        source: IdentitySource,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Option<Identity> {
        let peer = peer.map(|addr| Identity::Address(addr.ip().to_string()));
        if source == IdentitySource::PeerAddress {
            return peer;
        }

        if let Some(user) = header_str(headers, USER_ID_HEADER) {
            return Some(Identity::User(user.to_string()));
        }

        // best effort: proxy headers first, then the socket
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()));
        forwarded
            .or_else(|| header_str(headers, "x-real-ip"))
            .map(|addr| Identity::Address(addr.to_string()))
            .or(peer)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{id}"),
            Identity::Address(addr) => write!(f, "ip:{addr}"),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        // no identity means no bucket; never fall back to a shared one
        Identity::resolve(state.identity_source, &parts.headers, peer).ok_or_else(|| {
            AdmissionError::InvalidKey("request carries no resolvable identity".to_string()).into()
        })
    }
}
