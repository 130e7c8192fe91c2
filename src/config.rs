//! Client configuration, resolved once at construction time.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Cookie carrying the relying service's own session.
pub const DEFAULT_SESSION_COOKIE: &str = "tg-visit";

/// Cookie carrying the identity provider's session.
pub const DEFAULT_PROVIDER_COOKIE: &str = "FAS_OPENID";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Immutable settings for one [`OpenIdClient`](crate::client::OpenIdClient).
///
/// Built once, never reloaded. Everything beyond the two required URLs has a
/// default matching how the target service family deploys.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base of every URL used to contact the service.
    pub base_url: Url,
    /// Origin of the identity provider shared by all relying services.
    pub provider_url: Url,
    /// Login endpoint override; `{base_url}/login` when unset.
    pub login_url: Option<Url>,
    pub user_agent: String,
    /// Skip server certificate checks. Only for testing against a service
    /// with a self-signed certificate; leaves connections open to MITM.
    pub insecure: bool,
    /// Transport retry count. Zero means a single attempt, a negative
    /// count retries forever.
    pub retries: i32,
    /// Applies to connection establishment only, not response download.
    pub connect_timeout: Duration,
    pub session_cookie: String,
    pub provider_cookie: String,
    /// Persist session tokens on disk between runs.
    pub cache_sessions: bool,
    /// Session cache file override; a per-user default when unset.
    pub cache_path: Option<PathBuf>,
    /// User the client acts as until a login says otherwise.
    pub username: Option<String>,
    /// Seed token for the service session, as if a login had produced it.
    pub session_token: Option<String>,
    /// Seed token for the provider session.
    pub provider_token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: Url, provider_url: Url) -> Self {
        ClientConfig {
            base_url,
            provider_url,
            login_url: None,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            insecure: false,
            retries: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            provider_cookie: DEFAULT_PROVIDER_COOKIE.to_string(),
            cache_sessions: true,
            cache_path: None,
            username: None,
            session_token: None,
            provider_token: None,
        }
    }

    pub fn with_login_url(mut self, url: Url) -> Self {
        self.login_url = Some(url);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    pub fn with_provider_cookie(mut self, name: impl Into<String>) -> Self {
        self.provider_cookie = name.into();
        self
    }

    pub fn with_cache_sessions(mut self, enabled: bool) -> Self {
        self.cache_sessions = enabled;
        self
    }

    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_provider_token(mut self, token: impl Into<String>) -> Self {
        self.provider_token = Some(token.into());
        self
    }

    /// Login endpoint: the explicit override, or `/login` under the base URL.
    pub fn login_endpoint(&self) -> Result<Url, url::ParseError> {
        match &self.login_url {
            Some(url) => Ok(url.clone()),
            None => self.base_url.join("/login"),
        }
    }

    /// Where the session cache lives on disk.
    pub fn cache_file(&self) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return path.clone();
        }
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".openid-client").join("sessions.sqlite")
    }
}
