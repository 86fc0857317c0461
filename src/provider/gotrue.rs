//! GoTrue REST identity provider
//!
//! Keeps the provider-side session in memory, optionally mirrored to a JSON
//! file so a restarted process can bootstrap, and re-broadcasts every state
//! change as an `AuthEvent`.

use super::IdentityProvider;
use crate::models::{
    AuthEvent, AuthEventKind, ProfileUpdate, ProviderError, ProviderUser, Session, SignUpOutcome,
};
use crate::session::token_store::write_private_file;
use crate::settings::ProviderSettings;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, RwLock};
use url::Url;

/// Capacity of the auth event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Keys GoTrue uses for the human readable part of an error body, in order
const ERROR_MESSAGE_KEYS: [&str; 4] = ["msg", "message", "error_description", "error"];

pub struct GoTrueProvider {
    http: reqwest::Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
    session_file: Option<PathBuf>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for GoTrueProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueProvider")
            .field("base_url", &self.base_url.as_str())
            .field("session_file", &self.session_file)
            .field("api_key", &"***")
            .finish_non_exhaustive()
    }
}

impl GoTrueProvider {
    /// Create a provider for the auth API rooted at `base_url`
    ///
    /// # Errors
    /// Returns `ProviderError::Config` for an unparsable URL or API key
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        // Url::join replaces the last segment unless the path ends with '/'
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| ProviderError::Config(format!("Invalid provider URL '{base_url}': {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| ProviderError::Config(format!("Invalid API key header: {e}")))?,
        );
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url,
            session: RwLock::new(None),
            session_file: None,
            events,
        })
    }

    /// Build from the `[provider]` settings section
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when no API key is configured or the
    /// URL is invalid
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .get_api_key()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Config("No provider API key configured".to_string()))?;

        let provider = Self::new(&settings.url, &api_key)?;
        Ok(match &settings.session_file {
            Some(path) => provider.with_session_file(path),
            None => provider,
        })
    }

    /// Mirror the provider session to `path`, restoring whatever is there now
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_session_file(&path) {
            Ok(Some(session)) => {
                log::info!("Restored provider session from {}", path.display());
                self.session = RwLock::new(Some(session));
            }
            Ok(None) => {}
            Err(err) => log::warn!("Ignoring unreadable session file: {err:#}"),
        }
        self.session_file = Some(path);
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Config(format!("Invalid endpoint '{path}': {e}")))
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    async fn store_session(&self, session: &Session, kind: AuthEventKind) {
        *self.session.write().await = Some(session.clone());
        self.persist(Some(session));
        let _ = self.events.send(AuthEvent::new(kind, Some(session.clone())));
    }

    async fn clear_session(&self) {
        let previous = self.session.write().await.take();
        self.persist(None);
        if previous.is_some() {
            let _ = self.events.send(AuthEvent::signed_out());
        }
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(path) = &self.session_file else {
            return;
        };

        let result = match session {
            Some(session) => serde_json::to_vec_pretty(session)
                .context("Failed to serialize session")
                .and_then(|bytes| write_private_file(path, &bytes)),
            None => match fs::remove_file(path) {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(err)
                    .with_context(|| format!("Failed to remove {}", path.display())),
                _ => Ok(()),
            },
        };

        if let Err(err) = result {
            log::warn!("Failed to persist provider session: {err:#}");
        }
    }

    /// Drop local state when the API says the credentials are no longer valid
    async fn forget_if_gone(&self, err: ProviderError) -> ProviderError {
        if err.is_session_gone() {
            log::info!("Provider rejected stored credentials, clearing session");
            self.clear_session().await;
        }
        err
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        log::debug!("Stored provider session expired, refreshing");
        match self.refresh_session().await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(err) if err.is_session_gone() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, ProviderError> {
        let body = credentials_body(identifier, secret);
        let url = self.endpoint("token?grant_type=password")?;
        let resp = self.http.post(url).json(&body).send().await?;
        let session: Session = parse_json(read_json(resp).await?)?;
        self.store_session(&session, AuthEventKind::SignedIn).await;
        Ok(session)
    }

    async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        metadata: Map<String, Value>,
    ) -> Result<SignUpOutcome, ProviderError> {
        let mut body = credentials_body(identifier, secret);
        if !metadata.is_empty() {
            body["data"] = Value::Object(metadata);
        }

        let url = self.endpoint("signup")?;
        let resp = self.http.post(url).json(&body).send().await?;
        let outcome = parse_sign_up(read_json(resp).await?)?;
        if let Some(session) = &outcome.session {
            self.store_session(session, AuthEventKind::SignedIn).await;
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(token) = self.access_token().await else {
            self.clear_session().await;
            return Ok(());
        };

        let url = self.endpoint("logout")?;
        let result = match self.http.post(url).bearer_auth(token).send().await {
            Ok(resp) => read_json(resp).await.map(|_| ()),
            Err(err) => Err(err.into()),
        };

        self.clear_session().await;
        result
    }

    async fn get_user(&self) -> Result<Option<ProviderUser>, ProviderError> {
        let Some(token) = self.access_token().await else {
            return Ok(None);
        };

        let url = self.endpoint("user")?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        match read_json(resp).await {
            Ok(body) => parse_json(body).map(Some),
            Err(err) => Err(self.forget_if_gone(err).await),
        }
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<ProviderUser, ProviderError> {
        let token = self
            .access_token()
            .await
            .ok_or(ProviderError::SessionMissing)?;

        let url = self.endpoint("user")?;
        let resp = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;
        let user: ProviderUser = match read_json(resp).await {
            Ok(body) => parse_json(body)?,
            Err(err) => return Err(self.forget_if_gone(err).await),
        };

        let updated = self
            .current_session()
            .await
            .map(|session| session.with_user(user.clone()));
        if let Some(session) = updated {
            self.store_session(&session, AuthEventKind::UserUpdated).await;
        }
        Ok(user)
    }

    async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .current_session()
            .await
            .and_then(|session| session.refresh_token)
            .ok_or(ProviderError::SessionMissing)?;

        let url = self.endpoint("token?grant_type=refresh_token")?;
        let resp = self
            .http
            .post(url)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session: Session = match read_json(resp).await {
            Ok(body) => parse_json(body)?,
            Err(err) => return Err(self.forget_if_gone(err).await),
        };

        self.store_session(&session, AuthEventKind::TokenRefreshed)
            .await;
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "gotrue"
    }
}

/// Phone numbers sign in through `phone`, everything else through `email`
fn credentials_body(identifier: &str, secret: &str) -> Value {
    let identifier = identifier.trim();
    if identifier.starts_with('+') && !identifier.contains('@') {
        json!({ "phone": identifier, "password": secret })
    } else {
        json!({ "email": identifier, "password": secret })
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(parse_error_body(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ProviderError> {
    serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Map an error response to `ProviderError::Api`
fn parse_error_body(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ERROR_MESSAGE_KEYS.iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|msg| !msg.is_empty())
                    .map(String::from)
            })
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    ProviderError::Api { status, message }
}

/// Sign-up answers with a full session, or with the bare user when the
/// account still has to be confirmed
fn parse_sign_up(body: Value) -> Result<SignUpOutcome, ProviderError> {
    if body.get("access_token").is_some() {
        let session: Session = parse_json(body)?;
        return Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }

    let user_value = match body.get("user") {
        Some(user) => user.clone(),
        None => body,
    };
    let user = if user_value.get("id").is_some() {
        Some(parse_json(user_value)?)
    } else {
        None
    };
    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

fn read_session_file(path: &Path) -> anyhow::Result<Option<Session>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&contents)
        .map(Some)
        .with_context(|| format!("Failed to parse session in {}", path.display()))
}
