use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::ApiError, state::AppState};

pub const SESSION_COOKIE: &str = "token";

/// Signed session claims. Verifiable with the shared secret alone; no store
/// lookup is needed to authenticate a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

/// Extracts the authenticated user id from a `Bearer` header, falling back
/// to the session cookie set at login.
#[derive(Debug)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);

        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned);

        let token = match bearer {
            Some(t) => t,
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                jar.get(SESSION_COOKIE)
                    .map(|c| c.value().to_owned())
                    .ok_or_else(|| {
                        ApiError::Unauthenticated("Not authorized to access this route".into())
                    })?
            }
        };

        let claims = match keys.verify(&token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(ApiError::Unauthenticated(
                    "Invalid or expired token".into(),
                ));
            }
        };

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_session_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn verify_rejects_garbage() {
        let keys = make_keys();
        assert!(keys.verify("not-a-jwt").is_err());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_audience_or_issuer() {
        let keys = make_keys();
        let token = keys.sign(Uuid::new_v4()).expect("sign");

        let mut other = make_keys();
        other.issuer = "someone-else".into();
        other.audience = "other-aud".into();
        let err = other.verify(&token).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn extractor_accepts_bearer_header() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).unwrap();

        let request = axum::http::Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let AuthUser(got) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("bearer should authenticate");
        assert_eq!(got, user_id);
    }

    #[tokio::test]
    async fn extractor_falls_back_to_session_cookie() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).unwrap();

        let request = axum::http::Request::builder()
            .header("cookie", format!("{SESSION_COOKIE}={token}"))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let AuthUser(got) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("cookie should authenticate");
        assert_eq!(got, user_id);
    }

    #[tokio::test]
    async fn extractor_rejects_missing_credentials() {
        use axum::response::IntoResponse;

        let state = AppState::fake();
        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn extractor_rejects_token_signed_with_other_secret() {
        use axum::response::IntoResponse;

        let state = AppState::fake();
        let mut foreign = JwtKeys::from_ref(&state);
        foreign.encoding = jsonwebtoken::EncodingKey::from_secret(b"other-secret");
        let token = foreign.sign(Uuid::new_v4()).unwrap();

        let request = axum::http::Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }
}
