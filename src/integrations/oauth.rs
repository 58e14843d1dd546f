//! OAuth token persistence and refresh-on-expiry.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::info;

use super::{ProviderError, check_status};
use crate::retry::{RetryPolicy, retry};

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Strava,
    Google,
}

impl OAuthProvider {
    pub fn name(self) -> &'static str {
        match self {
            OAuthProvider::Strava => "strava",
            OAuthProvider::Google => "google",
        }
    }

    fn auth_url(self) -> &'static str {
        match self {
            OAuthProvider::Strava => "https://www.strava.com/oauth/authorize",
            OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    fn token_url(self) -> &'static str {
        match self {
            OAuthProvider::Strava => "https://www.strava.com/oauth/token",
            OAuthProvider::Google => "https://oauth2.googleapis.com/token",
        }
    }

    fn scope(self) -> &'static str {
        match self {
            OAuthProvider::Strava => "read,activity:read_all,profile:read_all",
            OAuthProvider::Google => "https://www.googleapis.com/auth/calendar",
        }
    }
}

/// Client credentials for one OAuth integration, as read from config.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_redirect_uri() -> String {
    "http://localhost/exchange_token".to_string()
}

#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }
}

/// Token endpoint response. Strava sends `expires_at`, Google `expires_in`,
/// and Google omits `refresh_token` on refresh.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<&str>, now: DateTime<Utc>) -> Result<OAuthToken, ProviderError> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .ok_or_else(|| ProviderError::Parse("token response has no refresh_token".into()))?;

        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc
                .timestamp_opt(at, 0)
                .single()
                .ok_or_else(|| ProviderError::Parse(format!("bad expires_at {at}")))?,
            (None, Some(secs)) => now + Duration::seconds(secs),
            (None, None) => return Err(ProviderError::Parse("token response has no expiry".into())),
        };

        Ok(OAuthToken {
            access_token: self.access_token,
            refresh_token,
            expires_at,
        })
    }
}

/// Persistent SQLite store of OAuth tokens keyed by (provider, user).
pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    pub fn open(path: &Path) -> Result<Self, ProviderError> {
        let conn = Connection::open(path).map_err(|e| ProviderError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, ProviderError> {
        let conn = Connection::open_in_memory().map_err(|e| ProviderError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ProviderError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                provider TEXT NOT NULL,
                user_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (provider, user_id)
            );
        "#,
        )
        .map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ProviderError> {
        self.conn
            .lock()
            .map_err(|_| ProviderError::Storage("token store lock poisoned".into()))
    }

    pub fn get(&self, provider: OAuthProvider, user_id: &str) -> Result<Option<OAuthToken>, ProviderError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at FROM oauth_tokens
                 WHERE provider = ?1 AND user_id = ?2",
                params![provider.name(), user_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()
            .map_err(|e| ProviderError::Storage(e.to_string()))?;

        Ok(row.and_then(|(access_token, refresh_token, expires_at)| {
            Utc.timestamp_opt(expires_at, 0).single().map(|expires_at| OAuthToken {
                access_token,
                refresh_token,
                expires_at,
            })
        }))
    }

    /// Insert or overwrite. Concurrent writers: last write wins.
    pub fn save(&self, provider: OAuthProvider, user_id: &str, token: &OAuthToken) -> Result<(), ProviderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO oauth_tokens (provider, user_id, access_token, refresh_token, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(provider, user_id) DO UPDATE SET
                access_token = ?3,
                refresh_token = ?4,
                expires_at = ?5,
                updated_at = ?6",
            params![
                provider.name(),
                user_id,
                token.access_token,
                token.refresh_token,
                token.expires_at.timestamp(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// One configured OAuth integration: issues URLs, exchanges codes and keeps
/// stored tokens fresh.
pub struct OAuthApp {
    provider: OAuthProvider,
    credentials: OAuthCredentials,
    store: Arc<TokenStore>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl OAuthApp {
    pub fn new(
        provider: OAuthProvider,
        credentials: OAuthCredentials,
        store: Arc<TokenStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            credentials,
            store,
            http: reqwest::Client::new(),
            retry,
        }
    }

    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.provider.auth_url(),
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.credentials.redirect_uri),
            urlencoding::encode(self.provider.scope()),
            urlencoding::encode(state),
        );
        match self.provider {
            OAuthProvider::Strava => url.push_str("&approval_prompt=force"),
            OAuthProvider::Google => url.push_str("&access_type=offline&prompt=consent"),
        }
        url
    }

    /// Exchange an authorization code and persist the resulting token.
    pub async fn exchange_code(&self, user_id: &str, code: &str) -> Result<OAuthToken, ProviderError> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ];
        let response = self.request_token(&form).await?;
        let token = response.into_token(None, Utc::now())?;
        self.store.save(self.provider, user_id, &token)?;
        info!("🔑 Stored {} token for user {}", self.provider.name(), user_id);
        Ok(token)
    }

    /// A valid access token for `user_id`, refreshing and rewriting it if expired.
    pub async fn access_token(&self, user_id: &str) -> Result<String, ProviderError> {
        let token = self
            .store
            .get(self.provider, user_id)?
            .ok_or(ProviderError::NotConnected(self.provider.name()))?;

        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }

        info!("🔄 Refreshing {} token for user {}", self.provider.name(), user_id);
        let refreshed = retry(&self.retry, "token refresh", ProviderError::is_retryable, || {
            self.refresh(&token.refresh_token)
        })
        .await?;
        self.store.save(self.provider, user_id, &refreshed)?;
        Ok(refreshed.access_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, ProviderError> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.request_token(&form).await?;
        response.into_token(Some(refresh_token), Utc::now())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ProviderError> {
        let response = self.http.post(self.provider.token_url()).form(form).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Pull the `code` query parameter out of a redirected URL, or out of a bare
/// query string.
pub fn extract_code(redirected: &str) -> Option<String> {
    let redirected = redirected.trim();
    let url = reqwest::Url::parse(redirected).or_else(|_| {
        let query = redirected.split_once('?').map_or(redirected, |(_, q)| q);
        reqwest::Url::parse(&format!("http://localhost/?{query}"))
    });
    url.ok()?
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}
