//! The OpenID login state machine and the authenticated request dispatcher.
//!
//! The client plays the part of the browser. The service it talks to hands
//! authentication off to an identity provider through a chain of
//! self-submitting HTML forms; [`OpenIdClient::login`] walks that chain,
//! and [`OpenIdClient::send_request`] replays the session cookies it earned
//! on ordinary API calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rquest::cookie::{CookieStore, Jar};
use rquest::header::HeaderMap;
use rquest::{Client, RequestBuilder, StatusCode};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::forms;
use crate::session::{SessionKey, SessionKind};
use crate::store::SessionStore;

/// Title the provider serves while a login transaction is pending. Seeing
/// it in a response body means the server bounced the request into a fresh
/// OpenID flow instead of serving the page that was asked for.
pub const TRANSACTION_MARKER: &str = "<title>OpenID transaction in progress</title>";

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Where in the redirect sequence a login attempt stands. Carried by
/// [`ClientError::Protocol`] so a broken hop names the step that broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Start,
    ProviderHandoff,
    Credentials,
    Consent,
    ServiceCallback,
    Authenticated,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginStage::Start => "the initial login fetch",
            LoginStage::ProviderHandoff => "the provider hand-off",
            LoginStage::Credentials => "credential submission",
            LoginStage::Consent => "consent submission",
            LoginStage::ServiceCallback => "the service callback",
            LoginStage::Authenticated => "an authenticated session",
        })
    }
}

/// A fully-read HTTP response handed back to callers.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    /// Final URL after any redirects.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

impl ServiceResponse {
    async fn read(response: rquest::Response) -> Result<Self> {
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(ServiceResponse {
            status,
            url,
            headers,
            body,
        })
    }
}

/// A client for services that rely on an OpenID provider for login.
///
/// One logical session per instance: methods take `&mut self` and callers
/// are expected to serialize use. The redirect dance runs through a single
/// shared cookie jar, so interleaving a login with other traffic on the
/// same instance would corrupt both.
pub struct OpenIdClient {
    config: ClientConfig,
    http: Client,
    jar: Arc<Jar>,
    store: SessionStore,
    username: String,
}

impl OpenIdClient {
    /// Build the client. A broken session-cache file degrades the store to
    /// memory-only with a warning; construction itself cannot fail on it.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = Self::build_http(&config, &jar)?;
        let mut store = SessionStore::open(&config.cache_file(), config.cache_sessions).await;
        if config.cache_sessions && !store.persistent() {
            warn!("session cache unavailable, tokens will not outlive this process");
        }

        let username = config.username.clone().unwrap_or_default();
        // tokens handed in at construction are treated exactly as if a
        // login had produced them
        if let Some(token) = &config.session_token {
            let key = SessionKey::resolve(&config, SessionKind::Service, &username);
            store.set(&key, token).await;
        }
        if let Some(token) = &config.provider_token {
            let key = SessionKey::resolve(&config, SessionKind::Provider, &username);
            store.set(&key, token).await;
        }

        Ok(OpenIdClient {
            config,
            http,
            jar,
            store,
            username,
        })
    }

    fn build_http(config: &ClientConfig, jar: &Arc<Jar>) -> Result<Client> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .cookie_provider(jar.clone())
            .build()?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// User the client currently acts as. Empty until a username is
    /// configured or a login succeeds.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Every session persisted on disk, newest first.
    pub async fn cached_sessions(&self) -> Vec<crate::store::SessionRecord> {
        self.store.records().await
    }

    /// Walk the OpenID redirect sequence and establish a session.
    ///
    /// When the session cookie from an earlier run is still valid the
    /// service skips the hand-off entirely and this costs exactly one
    /// request. `otp` is accepted for API compatibility and currently
    /// ignored.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<ServiceResponse> {
        if otp.is_some() {
            debug!("otp supplied but not implemented, ignoring");
        }

        let login_url = self.config.login_endpoint()?;
        debug!("login: GET {}", login_url);
        let response = self.execute(self.http.get(login_url)).await?;
        let page_url = response.url().clone();
        let reply = ServiceResponse::read(response).await?;
        if !reply.body.contains(TRANSACTION_MARKER) {
            info!("already authenticated against {}", self.config.base_url);
            return Ok(reply);
        }

        // Hand the service's redirect payload to the provider.
        let form = forms::parse_service_form(&reply.body)
            .map_err(|e| ClientError::protocol(LoginStage::ProviderHandoff, e.to_string()))?;
        let provider_url = page_url.join(&form.action)?;
        debug!("login: handing off to provider at {}", provider_url);
        let response = self
            .execute(self.http.post(provider_url).form(&form.to_params()))
            .await?;
        let mut page_url = response.url().clone();
        let body = ServiceResponse::read(response).await?.body;

        let mut form = forms::parse_provider_form(&body)
            .map_err(|e| ClientError::protocol(LoginStage::ProviderHandoff, e.to_string()))?;
        // form actions are relative to the page that served them, which
        // after redirects is not the service's base URL
        let mut action = page_url.join(&form.action)?;

        if form.contains("username") {
            // no live provider session: the provider wants credentials
            form.set("username", username);
            form.set("password", password);
            debug!("login: submitting credentials to {}", action);
            let response = self
                .execute(self.http.post(action).form(&form.to_params()))
                .await?;
            page_url = response.url().clone();
            let body = ServiceResponse::read(response).await?.body;
            form = forms::parse_provider_form(&body)
                .map_err(|e| ClientError::protocol(LoginStage::Credentials, e.to_string()))?;
            action = page_url.join(&form.action)?;
        } else {
            debug!("login: provider session still live, skipping credentials");
        }

        // The provider now wants consent; this client always allows.
        form.remove("decided_deny");
        debug!("login: confirming consent at {}", action);
        let provider_origin = action.clone();
        let response = self
            .execute(self.http.post(action).form(&form.to_params()))
            .await?;
        let callback_page = response.url().clone();
        let body = ServiceResponse::read(response).await?.body;

        // Provider dials back to the service to mint the session.
        let form = forms::parse_service_form(&body)
            .map_err(|e| ClientError::protocol(LoginStage::ServiceCallback, e.to_string()))?;
        let callback_url = callback_page.join(&form.action)?;
        debug!("login: completing callback at {}", callback_url);
        let response = self
            .execute(self.http.post(callback_url).form(&form.to_params()))
            .await?;
        let reply = ServiceResponse::read(response).await?;

        self.username = username.to_string();
        self.harvest_sessions(&provider_origin).await;
        info!("login complete for {}", self.username);
        Ok(reply)
    }

    /// Issue a request against a service endpoint.
    ///
    /// `method` is the URL fragment after the base URL. GET sends `params`
    /// as the query string, POST as a form body; other verbs are refused.
    /// With `auth` set, cached session tokens ride along as cookies and a
    /// response that turns out to be a fresh OpenID transaction invalidates
    /// them and surfaces as [`ClientError::LoginRequired`] instead of a
    /// useless interstitial page. Retrying after a login is the caller's
    /// decision, never this method's.
    pub async fn send_request(
        &mut self,
        method: &str,
        verb: &str,
        auth: bool,
        params: Option<&HashMap<String, String>>,
    ) -> Result<ServiceResponse> {
        let url = self.config.base_url.join(method)?;
        if auth {
            self.attach_session_cookies().await;
        }

        let request = match verb.to_ascii_uppercase().as_str() {
            "GET" => {
                let mut builder = self.http.get(url);
                if let Some(params) = params {
                    builder = builder.query(params);
                }
                builder
            }
            "POST" => {
                let mut builder = self.http.post(url);
                if let Some(params) = params {
                    builder = builder.form(params);
                }
                builder
            }
            _ => return Err(ClientError::UnsupportedVerb(verb.to_string())),
        };

        let response = self.execute(request).await?;
        let reply = ServiceResponse::read(response).await?;

        if auth && reply.body.contains(TRANSACTION_MARKER) {
            // the server swallowed the call and started a fresh OpenID
            // transaction: the cached session is dead
            warn!("session for {:?} rejected by {}", self.username, reply.url);
            self.invalidate_sessions().await;
            return Err(ClientError::LoginRequired {
                url: reply.url.to_string(),
            });
        }

        Ok(reply)
    }

    /// Drop the current user's sessions everywhere: memory, disk and the
    /// live cookie jar.
    pub async fn logout(&mut self) -> Result<()> {
        self.invalidate_sessions().await;
        self.jar = Arc::new(Jar::default());
        self.http = Self::build_http(&self.config, &self.jar)?;
        info!("logged out {:?}", self.username);
        Ok(())
    }

    /// Send a request, retrying transport-level failures per the configured
    /// policy: zero retries is a single attempt, a negative count never
    /// gives up. Protocol-level failures are never retried.
    async fn execute(&self, request: RequestBuilder) -> Result<rquest::Response> {
        let mut remaining = self.config.retries;
        loop {
            let attempt = match request.try_clone() {
                Some(clone) => clone,
                // a non-replayable body gets exactly one attempt
                None => return Ok(request.send().await?),
            };
            match attempt.send().await {
                Ok(response) => return Ok(response),
                Err(e) if remaining != 0 => {
                    warn!("transport error, retrying: {}", e);
                    if remaining > 0 {
                        remaining -= 1;
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(ClientError::Transport(e)),
            }
        }
    }

    /// Load both cached tokens into the jar so the next request presents
    /// them. Absent tokens are simply omitted; the server rejects the call
    /// itself if it minds.
    async fn attach_session_cookies(&mut self) {
        let username = self.username.clone();
        let service_key = SessionKey::resolve(&self.config, SessionKind::Service, &username);
        let provider_key = SessionKey::resolve(&self.config, SessionKind::Provider, &username);
        if let Some(token) = self.store.get(&service_key).await {
            add_cookie(
                &self.jar,
                &self.config.base_url,
                &self.config.session_cookie,
                &token,
            );
        }
        if let Some(token) = self.store.get(&provider_key).await {
            add_cookie(
                &self.jar,
                &self.config.provider_url,
                &self.config.provider_cookie,
                &token,
            );
        }
    }

    /// Pull the session cookies the flow just minted out of the jar and
    /// persist them for the next run.
    async fn harvest_sessions(&mut self, provider_origin: &Url) {
        let username = self.username.clone();

        match cookie_value(
            &self.jar,
            &self.config.base_url,
            &self.config.session_cookie,
        ) {
            Some(token) => {
                let key = SessionKey::resolve(&self.config, SessionKind::Service, &username);
                self.store.set(&key, &token).await;
            }
            None => warn!("no {} cookie after login", self.config.session_cookie),
        }

        // the provider cookie lives on whatever origin the dance actually
        // went through, which can differ from the configured one
        let token = cookie_value(&self.jar, provider_origin, &self.config.provider_cookie)
            .or_else(|| {
                cookie_value(
                    &self.jar,
                    &self.config.provider_url,
                    &self.config.provider_cookie,
                )
            });
        match token {
            Some(token) => {
                let key = SessionKey::resolve(&self.config, SessionKind::Provider, &username);
                self.store.set(&key, &token).await;
            }
            None => warn!("no {} cookie after login", self.config.provider_cookie),
        }
    }

    async fn invalidate_sessions(&mut self) {
        let username = self.username.clone();
        let service_key = SessionKey::resolve(&self.config, SessionKind::Service, &username);
        let provider_key = SessionKey::resolve(&self.config, SessionKind::Provider, &username);
        self.store.delete(&service_key).await;
        self.store.delete(&provider_key).await;
    }
}

fn add_cookie(jar: &Jar, url: &Url, name: &str, value: &str) {
    jar.add_cookie_str(&format!("{}={}; Path=/", name, value), url);
}

fn cookie_value(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header.split(';').map(str::trim).find_map(|pair| {
        pair.strip_prefix(name)?
            .strip_prefix('=')
            .map(str::to_string)
    })
}
