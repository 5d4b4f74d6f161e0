use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{AuthState, AuthStore, Credential, IdentityProvider, Principal};
use crate::config::AuthConfig;
use crate::error::CredentialError;
use crate::http::HttpClient;

/// Seconds of remaining lifetime below which a cached token is refreshed.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the identity service omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Anonymous principal provisioned silently against the identity service.
///
/// `start` signs in once. A failure is logged and surfaced as
/// [`AuthState::Failed`] rather than returned, so callers only ever observe
/// the store. The id token is cached here and refreshed shortly before expiry.
pub struct AnonymousIdentity {
    http_client: HttpClient,
    api_key: Option<String>,
    sign_up_url: String,
    refresh_url: String,
    store: AuthStore,
    session: Mutex<Option<Session>>,
}

struct Session {
    uid: String,
    id_token: String,
    refresh_token: String,
    expires_at: u64,
}

impl Session {
    fn is_token_valid(&self) -> bool {
        now_secs() + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl AnonymousIdentity {
    pub fn new(http_client: HttpClient, config: &AuthConfig) -> Self {
        Self {
            http_client,
            api_key: config.api_key.clone(),
            sign_up_url: config.sign_up_url.clone(),
            refresh_url: config.refresh_url.clone(),
            store: AuthStore::new(),
            session: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    /// Provision an anonymous principal if none exists yet.
    pub async fn start(&self) {
        if self.store.current().principal().is_some() {
            return;
        }

        match self.sign_up().await {
            Ok(session) => {
                info!(uid = %session.uid, "Signed in anonymously");
                let principal = Principal {
                    uid: session.uid.clone(),
                    anonymous: true,
                };
                *self.session.lock().await = Some(session);
                self.store.set(AuthState::Ready(principal));
            }
            Err(e) => {
                error!(error = %e, "Automatic anonymous sign-in failed");
                self.store.set(AuthState::Failed(e.to_string()));
            }
        }
    }

    async fn sign_up(&self) -> Result<Session, CredentialError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CredentialError::SignUpFailed("auth.api_key is not set".into()))?;

        let url = with_key(&self.sign_up_url, api_key);
        let body = serde_json::to_vec(&SignUpRequest {
            return_secure_token: true,
        })
        .map_err(|e| CredentialError::SignUpFailed(e.to_string()))?;

        debug!("Requesting anonymous sign-in");
        let response = self
            .http_client
            .post_json(&url, &body)
            .await
            .map_err(CredentialError::SignUpFailed)?;

        let tokens: SignUpResponse = serde_json::from_slice(&response)
            .map_err(|e| CredentialError::SignUpFailed(e.to_string()))?;

        Ok(Session {
            uid: tokens.local_id,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: now_secs() + parse_lifetime(tokens.expires_in.as_deref()),
        })
    }

    async fn refresh(&self, session: &mut Session) -> Result<(), CredentialError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CredentialError::RefreshFailed("auth.api_key is not set".into()))?;

        let url = with_key(&self.refresh_url, api_key);
        let body = format!(
            "grant_type=refresh_token&refresh_token={}",
            session.refresh_token
        );

        let response = self
            .http_client
            .post_form(&url, &body)
            .await
            .map_err(CredentialError::RefreshFailed)?;

        let tokens: RefreshResponse = serde_json::from_slice(&response)
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        if let Some(uid) = tokens.user_id.filter(|uid| uid != &session.uid) {
            warn!(old = %session.uid, new = %uid, "Refresh returned a different user");
            session.uid = uid;
        }
        session.id_token = tokens.id_token;
        session.refresh_token = tokens.refresh_token;
        session.expires_at = now_secs() + parse_lifetime(tokens.expires_in.as_deref());

        debug!(uid = %session.uid, "Refreshed id token");
        Ok(())
    }
}

impl IdentityProvider for AnonymousIdentity {
    fn auth_state(&self) -> AuthState {
        self.store.current()
    }

    async fn mint_token(&self) -> Result<Credential, CredentialError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(CredentialError::NotAuthenticated)?;

        if !session.is_token_valid() {
            self.refresh(session).await?;
        }

        Ok(Credential::new(session.id_token.clone()))
    }
}

fn with_key(url: &str, api_key: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}key={api_key}")
}

fn parse_lifetime(expires_in: Option<&str>) -> u64 {
    expires_in
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
