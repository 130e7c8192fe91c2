//! Session cache keys.

use crate::config::ClientConfig;

/// Which credential a cached token represents.
///
/// The service session and the provider session are independent credentials
/// with independent lifetimes, so they occupy separate cache slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// The relying service's own session cookie.
    Service,
    /// The identity provider's session cookie, shared by every relying
    /// service behind the same provider.
    Provider,
}

/// One cached token slot: one user against one origin.
///
/// The kind is folded into `base_url` by [`SessionKey::resolve`]; the
/// storage schema has no separate kind column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub base_url: String,
    pub username: String,
}

impl SessionKey {
    /// Resolve the storage key for a token of the given kind. Provider
    /// tokens always key on the configured provider origin, whatever
    /// service the client is pointed at: there is exactly one provider
    /// shared across all relying services.
    pub fn resolve(config: &ClientConfig, kind: SessionKind, username: &str) -> Self {
        let origin = match kind {
            SessionKind::Service => &config.base_url,
            SessionKind::Provider => &config.provider_url,
        };
        SessionKey {
            base_url: origin.as_str().trim_end_matches('/').to_string(),
            username: username.to_string(),
        }
    }
}
