//! Cookie-backed session state.
//!
//! The whole session (authenticated user id, transient post-login redirect
//! target and pending flash notices) travels as a signed token inside an
//! HttpOnly cookie. A missing, tampered or expired cookie simply yields a
//! fresh anonymous session.

use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::error;

use crate::{config::SessionConfig, state::AppState};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

/// One-shot notice shown on the next rendered page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

/// Payload carried by the session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub name: Option<String>,
    /// URL the user tried to reach before being sent to login; consumed once.
    pub next: Option<String>,
    #[serde(default)]
    pub flash: Vec<Flash>,
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    exp: usize,
    iat: usize,
    iss: String,
    aud: String,
    #[serde(flatten)]
    data: SessionData,
}

#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl SessionKeys {
    pub fn sign(&self, data: &SessionData) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            data: data.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionData> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims.data)
    }
}

/// Request-scoped session. Extracting it never fails; broken cookies fall
/// back to an anonymous session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub data: SessionData,
}

impl Session {
    pub fn from_parts(parts: &Parts, keys: &SessionKeys) -> Self {
        let data = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(cookie_value)
            .and_then(|token| keys.verify(token).ok())
            .unwrap_or_default();
        Self { data }
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.user_id.is_some()
    }

    pub fn login(&mut self, user_id: i64, username: &str, name: &str) {
        self.data.user_id = Some(user_id);
        self.data.username = Some(username.to_string());
        self.data.name = Some(name.to_string());
    }

    pub fn clear(&mut self) {
        self.data = SessionData::default();
    }

    pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
        self.data.flash.push(Flash {
            level,
            message: message.into(),
        });
    }

    pub fn take_flash(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.data.flash)
    }

    pub fn take_next(&mut self) -> Option<String> {
        self.data.next.take()
    }

    fn set_cookie(&self, keys: &SessionKeys) -> anyhow::Result<HeaderMap> {
        let token = keys.sign(&self.data)?;
        let cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            keys.ttl.as_secs()
        );
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, cookie.parse()?);
        Ok(headers)
    }

    /// Set-Cookie headers persisting the current state. Signing failures are
    /// logged and yield no headers rather than breaking the response.
    pub fn save(self, keys: &SessionKeys) -> HeaderMap {
        match self.set_cookie(keys) {
            Ok(headers) => headers,
            Err(e) => {
                error!(error = %e, "failed to sign session cookie");
                HeaderMap::new()
            }
        }
    }

    /// 303 redirect carrying the persisted session.
    pub fn redirect(self, keys: &SessionKeys, to: &str) -> Response {
        let headers = self.save(keys);
        (headers, Redirect::to(to)).into_response()
    }
}

fn cookie_value(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("session="))
        .filter(|v| !v.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(Session::from_parts(parts, &keys))
    }
}

/// Id of the authenticated user. Backstop behind the `login_required` gate.
pub struct CurrentUser(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (axum::http::StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        let session = Session::from_parts(parts, &keys);
        session.data.user_id.map(CurrentUser).ok_or((
            axum::http::StatusCode::UNAUTHORIZED,
            "Não autenticado".to_string(),
        ))
    }
}
