//! Identity collaborators for the rewrite client.
//!
//! The client never owns authentication. It is handed an [`IdentityProvider`]
//! that reports whether a principal is signed in and mints a fresh bearer
//! credential per request. Sign-in progress is published through an
//! [`AuthStore`] so observers can react when the identity becomes ready.

pub mod anonymous;

pub use anonymous::AnonymousIdentity;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{AuthMode, Config};
use crate::error::CredentialError;
use crate::http::HttpClient;

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub anonymous: bool,
}

/// Sign-in lifecycle: `Pending` until provisioning settles, then `Ready` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Ready(Principal),
    Failed(String),
}

impl AuthState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AuthState::Pending)
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::Ready(principal) => Some(principal),
            _ => None,
        }
    }
}

/// Time-limited bearer token. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Authorization header value, with `scheme` prepended when given.
    pub fn header_value(&self, scheme: Option<&str>) -> String {
        match scheme.map(str::trim).filter(|s| !s.is_empty()) {
            Some(scheme) => format!("{} {}", scheme, self.0),
            None => self.0.clone(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Observable holder of the current [`AuthState`].
#[derive(Clone)]
pub struct AuthStore {
    tx: Arc<watch::Sender<AuthState>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(AuthState::Pending)),
        }
    }

    pub fn ready(principal: Principal) -> Self {
        let store = Self::new();
        store.set(AuthState::Ready(principal));
        store
    }

    pub fn set(&self, state: AuthState) {
        self.tx.send_replace(state);
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Wait until sign-in leaves `Pending`, or `timeout` elapses.
    pub async fn wait_settled(&self, timeout: Duration) -> AuthState {
        let mut rx = self.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|state| !state.is_pending())).await {
            Ok(Ok(state)) => state.clone(),
            _ => self.current(),
        }
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of identity and bearer credentials for outgoing requests.
pub trait IdentityProvider: Send + Sync {
    fn auth_state(&self) -> AuthState;

    /// Mint a credential for one request. Implementations may refresh upstream.
    fn mint_token(&self) -> impl Future<Output = Result<Credential, CredentialError>> + Send;
}

impl<P: IdentityProvider> IdentityProvider for Arc<P> {
    fn auth_state(&self) -> AuthState {
        (**self).auth_state()
    }

    fn mint_token(&self) -> impl Future<Output = Result<Credential, CredentialError>> + Send {
        (**self).mint_token()
    }
}

/// Fixed token supplied by the user. Always ready.
pub struct StaticIdentity {
    credential: Credential,
    store: AuthStore,
}

impl StaticIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::new(token),
            store: AuthStore::ready(Principal {
                uid: "static".to_string(),
                anonymous: false,
            }),
        }
    }

    pub fn store(&self) -> &AuthStore {
        &self.store
    }
}

impl IdentityProvider for StaticIdentity {
    fn auth_state(&self) -> AuthState {
        self.store.current()
    }

    async fn mint_token(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }
}

/// Provider selected from configuration.
pub enum ConfiguredIdentity {
    Static(StaticIdentity),
    Anonymous(AnonymousIdentity),
}

impl ConfiguredIdentity {
    /// Build the provider for `config.auth`. Anonymous sign-in is not started here.
    ///
    /// Token mode without a token is an error rather than a silent anonymous sign-in.
    pub fn from_config(config: &Config, http_client: HttpClient) -> Result<Self, CredentialError> {
        match config.auth_mode() {
            AuthMode::Token => {
                let token = config
                    .auth
                    .token
                    .as_deref()
                    .ok_or(CredentialError::NotAuthenticated)?;
                Ok(ConfiguredIdentity::Static(StaticIdentity::new(token)))
            }
            AuthMode::Anonymous => Ok(ConfiguredIdentity::Anonymous(AnonymousIdentity::new(
                http_client,
                &config.auth,
            ))),
        }
    }

    pub fn store(&self) -> &AuthStore {
        match self {
            ConfiguredIdentity::Static(identity) => identity.store(),
            ConfiguredIdentity::Anonymous(identity) => identity.store(),
        }
    }

    /// Kick off provisioning; a no-op for static tokens.
    pub async fn start(&self) {
        if let ConfiguredIdentity::Anonymous(identity) = self {
            identity.start().await;
        }
    }
}

impl IdentityProvider for ConfiguredIdentity {
    fn auth_state(&self) -> AuthState {
        self.store().current()
    }

    async fn mint_token(&self) -> Result<Credential, CredentialError> {
        match self {
            ConfiguredIdentity::Static(identity) => identity.mint_token().await,
            ConfiguredIdentity::Anonymous(identity) => identity.mint_token().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_header_value_raw() {
        let credential = Credential::new("abc");
        assert_eq!(credential.header_value(None), "abc");
        assert_eq!(credential.header_value(Some("")), "abc");
    }

    #[test]
    fn test_credential_header_value_with_scheme() {
        let credential = Credential::new("abc");
        assert_eq!(credential.header_value(Some("Bearer")), "Bearer abc");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert!(!format!("{:?}", credential).contains("secret"));
    }

    #[test]
    fn test_auth_store_starts_pending() {
        let store = AuthStore::new();
        assert!(store.current().is_pending());
        assert!(store.current().principal().is_none());
    }

    #[tokio::test]
    async fn test_wait_settled_reacts_to_ready() {
        let store = AuthStore::new();
        let setter = store.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set(AuthState::Ready(Principal {
                uid: "u1".to_string(),
                anonymous: true,
            }));
        });

        let state = store.wait_settled(Duration::from_secs(5)).await;
        assert_eq!(state.principal().map(|p| p.uid.as_str()), Some("u1"));
    }

    #[tokio::test]
    async fn test_wait_settled_times_out_while_pending() {
        let store = AuthStore::new();
        let state = store.wait_settled(Duration::from_millis(20)).await;
        assert!(state.is_pending());
    }

    #[tokio::test]
    async fn test_static_identity_is_ready() {
        let identity = StaticIdentity::new("tok");
        assert!(identity.auth_state().principal().is_some());
        assert_eq!(identity.mint_token().await.unwrap().as_str(), "tok");
    }

    #[test]
    fn test_configured_identity_uses_token_mode() {
        let config = Config::default().with_overrides(None, Some("tok".to_string()), false);
        let identity = ConfiguredIdentity::from_config(&config, HttpClient::default()).unwrap();
        assert!(matches!(identity, ConfiguredIdentity::Static(_)));
        assert!(identity.auth_state().principal().is_some());
    }

    #[test]
    fn test_token_mode_without_token_is_rejected() {
        let mut config = Config::default();
        config.auth.mode = "token".to_string();
        config.auth.token = None;

        let result = ConfiguredIdentity::from_config(&config, HttpClient::default());
        assert!(matches!(result, Err(CredentialError::NotAuthenticated)));
    }

    #[test]
    fn test_anonymous_mode_ignores_token() {
        let mut config = Config::default();
        config.auth.token = Some("tok".to_string());

        let identity = ConfiguredIdentity::from_config(&config, HttpClient::default()).unwrap();
        assert!(matches!(identity, ConfiguredIdentity::Anonymous(_)));
        assert!(identity.auth_state().is_pending());
    }
}
