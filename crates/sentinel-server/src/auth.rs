//! Transport authentication.
//!
//! Over loopback TCP every request must carry the per-process bearer
//! token in the `Authorization` header, compared in constant time. Over a
//! Unix socket the kernel's peer credentials stand in for the token: the
//! peer uid must match the uid that owns the server.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::error::ServerError;

/// A random per-process bearer token, 32 bytes of OS entropy, hex.
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The header value a client must send.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison. Length differences short-circuit, which
    /// is fine: the token length is public.
    pub fn matches(&self, presented: &str) -> bool {
        let ours = self.0.as_bytes();
        let theirs = presented.as_bytes();
        if theirs.is_empty() || ours.len() != theirs.len() {
            return false;
        }
        ours.ct_eq(theirs).into()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Middleware for loopback TCP: reject any request whose `Authorization`
/// header does not match the process token.
pub async fn require_bearer(
    State(token): State<BearerToken>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !token.matches(presented) {
        return Err(ServerError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Peer credentials captured at accept time on a Unix socket.
#[cfg(unix)]
#[derive(Clone, Debug)]
pub struct UdsPeer {
    pub uid: Option<u32>,
}

#[cfg(unix)]
impl axum::extract::connect_info::Connected<axum::serve::IncomingStream<'_, tokio::net::UnixListener>>
    for UdsPeer
{
    fn connect_info(
        stream: axum::serve::IncomingStream<'_, tokio::net::UnixListener>,
    ) -> Self {
        Self {
            uid: stream.io().peer_cred().ok().map(|cred| cred.uid()),
        }
    }
}

/// Middleware for the Unix-socket transport: the connecting process must
/// run as the same uid as the server.
#[cfg(unix)]
pub async fn require_peer_uid(
    State(expected_uid): State<u32>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let peer = request
        .extensions()
        .get::<axum::extract::ConnectInfo<UdsPeer>>()
        .map(|info| info.0.clone());

    match peer.and_then(|p| p.uid) {
        Some(uid) if uid == expected_uid => Ok(next.run(request).await),
        _ => Err(ServerError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_matches_itself_only() {
        let token = BearerToken::generate();
        let value = token.reveal().to_string();
        assert!(token.matches(&value));
        assert!(!token.matches(""));
        assert!(!token.matches(&value[..value.len() - 1]));
        assert!(!token.matches(&format!("{value}0")));

        let mut flipped = value.into_bytes();
        flipped[0] ^= 1;
        assert!(!token.matches(std::str::from_utf8(&flipped).unwrap()));
    }

    #[test]
    fn tokens_are_unique_and_64_hex() {
        let a = BearerToken::generate();
        let b = BearerToken::generate();
        assert_eq!(a.reveal().len(), 64);
        assert_ne!(a.reveal(), b.reveal());
    }

    #[test]
    fn debug_never_prints_the_token() {
        let token = BearerToken::generate();
        assert!(!format!("{token:?}").contains(token.reveal()));
    }
}
