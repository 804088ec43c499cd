use std::collections::HashMap;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, MeResponse, MessageResponse, RegisterRequest,
            RegisterResponse, RegisteredUser, ResendVerificationRequest, ResetPasswordRequest,
            SessionResponse, SocialLoginRequest,
        },
        jwt::{AuthUser, JwtKeys, SESSION_COOKIE},
        password::{hash_password, verify_password},
        repo_types::{SocialLink, User},
        secrets,
    },
    error::ApiError,
    notifier::Mail,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Sign a session token for the user and mirror it into the `token` cookie
/// (httpOnly, 7-day default, secure in production).
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;

    let mut cookie = Cookie::new(SESSION_COOKIE, token.clone());
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_secure(state.config.cookie.secure);
    cookie.set_expires(OffsetDateTime::now_utc() + Duration::days(state.config.cookie.ttl_days));

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            success: true,
            token,
            user: user.into(),
        }),
    ))
}

fn otp_mail(to: &str, otp: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Email Verification".into(),
        text: format!(
            "Your email verification OTP is: {otp}\n\nThis OTP will expire in 10 minutes."
        ),
        html: format!(
            "<h2>Email Verification</h2>\
             <p>Your email verification OTP is:</p>\
             <h1 style=\"color: #4CAF50; font-size: 32px; letter-spacing: 5px;\">{otp}</h1>\
             <p>Please enter this OTP in the app to verify your email.</p>\
             <p>This OTP will expire in 10 minutes.</p>"
        ),
    }
}

fn reset_mail(to: &str, reset_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Password Reset Token".into(),
        text: format!(
            "You are receiving this email because you (or someone else) has requested the \
             reset of a password. Please make a PUT request to: \n\n {reset_url}"
        ),
        html: format!(
            "<h1>Password Reset Request</h1>\
             <p>You are receiving this email because you (or someone else) has requested the \
             reset of a password.</p>\
             <p>Please click the link below to reset your password:</p>\
             <a href=\"{reset_url}\">Reset Password</a>\
             <p>If you did not request this, please ignore this email and your password will \
             remain unchanged.</p>\
             <p>This link will expire in 10 minutes.</p>"
        ),
    }
}

fn verification_mail(to: &str, verification_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Email Verification".into(),
        text: format!("Please verify your email by clicking on this link: \n\n {verification_url}"),
        html: format!(
            "<h2>Email Verification</h2>\
             <p>Please verify your email by clicking the link below:</p>\
             <a href=\"{verification_url}\">Verify Email</a>\
             <p>If the button doesn't work, copy and paste this link in your browser:</p>\
             <p>{verification_url}</p>\
             <p>This link will expire in 24 hours.</p>"
        ),
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.name = payload.name.trim().to_string();
    payload.email = normalize_email(&payload.email);

    if payload.name.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(
            "Please provide name, email and password".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::InvalidInput("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::InvalidInput("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict(
            "User already exists with this email".into(),
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &hash,
        None,
        HashMap::new(),
        false,
    )
    .await?;

    let otp = secrets::mint_otp();
    let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
    User::set_verification_otp(&state.db, user.id, &otp, expires).await?;

    // Delivery is best-effort: registration already succeeded. On failure
    // the issued secret is cleared and the 201 reports degraded success.
    let message = match state.notifier.send(&otp_mail(&user.email, &otp)).await {
        Ok(()) => {
            "User registered successfully. Please check your email to verify your account."
        }
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "verification email failed, clearing OTP");
            User::clear_verification_otp(&state.db, user.id).await?;
            "User registered successfully, but the verification email could not be sent. \
             Please contact support."
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: message.into(),
            user: RegisteredUser {
                id: user.id,
                name: user.name,
                email: user.email,
                email_verified: user.email_verified,
            },
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    payload.email = normalize_email(&payload.email);

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(
            "Please provide an email and password".into(),
        ));
    }

    // Unknown email and wrong password produce the identical 401. The 403
    // for an unverified account is only reachable after the password check.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::invalid_credentials());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::invalid_credentials());
    }

    if !user.email_verified {
        warn!(user_id = %user.id, "login refused, email not verified");
        return Err(ApiError::Forbidden(
            "Please verify your email before logging in".into(),
        ));
    }

    User::stamp_last_login(&state.db, user.id).await?;
    let mut user = user;
    user.last_login = Some(OffsetDateTime::now_utc());

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_session(&state, jar, &user)
}

#[instrument(skip(state, jar, payload))]
pub async fn social_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<SocialLoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    payload.email = normalize_email(&payload.email);
    payload.provider = payload.provider.trim().to_lowercase();

    if payload.provider.is_empty() || payload.provider_id.is_empty() || payload.email.is_empty() {
        return Err(ApiError::InvalidInput(
            "Please provide provider, providerId, and email".into(),
        ));
    }

    let link = SocialLink {
        id: payload.provider_id.clone(),
        access_token: payload.access_token.clone(),
    };

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(mut user) => {
            // Linking is idempotent: an already linked provider is left as is.
            if !user.has_provider(&payload.provider) {
                User::link_provider(&state.db, user.id, &payload.provider, &link).await?;
                user.social_providers
                    .0
                    .insert(payload.provider.clone(), link);
                info!(user_id = %user.id, provider = %payload.provider, "social provider linked");
            }
            user
        }
        None => {
            // Social accounts get a random unusable password and are
            // pre-verified.
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            let hash = hash_password(&hex::encode(bytes))?;

            let mut providers = HashMap::new();
            providers.insert(payload.provider.clone(), link);

            let user = User::create(
                &state.db,
                payload.name.as_deref().unwrap_or("Social User"),
                &payload.email,
                &hash,
                payload.photo.as_deref(),
                providers,
                true,
            )
            .await?;
            info!(user_id = %user.id, provider = %payload.provider, "social user created");
            user
        }
    };

    issue_session(&state, jar, &user)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("User not found".into()))?;

    Ok(Json(MeResponse {
        success: true,
        user: (&user).into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);
    if payload.email.is_empty() {
        return Err(ApiError::InvalidInput(
            "Please provide an email address".into(),
        ));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("There is no user with that email".into()))?;

    let (raw, digest) = secrets::mint_secret();
    let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
    User::set_reset_secret(&state.db, user.id, &digest, expires).await?;

    let reset_url = format!("{}/auth/resetpassword/{raw}", state.config.base_url);
    if let Err(e) = state.notifier.send(&reset_mail(&user.email, &reset_url)).await {
        warn!(error = %e, user_id = %user.id, "reset email failed, clearing secret");
        User::clear_reset_secret(&state.db, user.id).await?;
        return Err(ApiError::DeliveryFailed);
    }

    info!(user_id = %user.id, "password reset email sent");
    Ok(Json(MessageResponse::ok("Email sent successfully")))
}

#[instrument(skip(state, jar, payload, token))]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidInput("Password too short".into()));
    }

    let digest = secrets::digest(&token);
    let user = User::find_by_reset_digest(&state.db, &digest, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| ApiError::InvalidOrExpired("Invalid token or token has expired".into()))?;

    // The guarded UPDATE consumes the secret; a concurrent second redemption
    // updates zero rows and is rejected here.
    let hash = hash_password(&payload.password)?;
    if !User::set_password_and_clear_reset(&state.db, user.id, &hash, &digest).await? {
        return Err(ApiError::InvalidOrExpired(
            "Invalid token or token has expired".into(),
        ));
    }

    info!(user_id = %user.id, "password reset");
    issue_session(&state, jar, &user)
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let digest = secrets::digest(&token);
    let user = User::find_by_verification_digest(&state.db, &digest, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| {
            ApiError::InvalidOrExpired("Invalid or expired verification token".into())
        })?;

    User::mark_verified_clear_token(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified via token");
    Ok(Json(MessageResponse::ok("Email verified successfully")))
}

#[instrument(skip(state, otp))]
pub async fn verify_email_otp(
    State(state): State<AppState>,
    Path((otp, email)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&email);
    let user =
        User::find_unverified_by_otp(&state.db, &email, &otp, OffsetDateTime::now_utc())
            .await?
            .ok_or_else(|| ApiError::InvalidOrExpired("Invalid or expired OTP".into()))?;

    User::mark_verified_clear_otp(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified via OTP");
    Ok(Json(MessageResponse::ok(
        "Email verified successfully with OTP",
    )))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(mut payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);
    if payload.email.is_empty() {
        return Err(ApiError::InvalidInput(
            "Please provide an email address".into(),
        ));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if user.email_verified {
        return Err(ApiError::InvalidInput("Email is already verified".into()));
    }

    // Regeneration supersedes any previously issued link token.
    let (raw, digest) = secrets::mint_secret();
    let expires = OffsetDateTime::now_utc() + Duration::hours(24);
    User::set_verification_token(&state.db, user.id, &digest, expires).await?;

    let verification_url = format!("{}/auth/verify-email/{raw}", state.config.base_url);
    if let Err(e) = state
        .notifier
        .send(&verification_mail(&user.email, &verification_url))
        .await
    {
        warn!(error = %e, user_id = %user.id, "verification email failed, clearing secret");
        User::clear_verification_token(&state.db, user.id).await?;
        return Err(ApiError::DeliveryFailed);
    }

    info!(user_id = %user.id, "verification email resent");
    Ok(Json(MessageResponse::ok(
        "Verification email sent successfully",
    )))
}

/// Logout expires the session cookie with a short-lived sentinel. The signed
/// bearer token itself stays valid until its `exp`; the server keeps no
/// session state to revoke.
#[instrument(skip(jar))]
pub async fn logout(
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let mut cookie = Cookie::new(SESSION_COOKIE, "none");
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_expires(OffsetDateTime::now_utc() + Duration::seconds(10));

    info!(user_id = %user_id, "user logged out");
    (
        jar.add(cookie),
        Json(MessageResponse::ok("User logged out successfully")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("ann@x.com"));
        assert!(is_valid_email("a.b-c@sub.domain.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a @b.com"));
        assert!(!is_valid_email("a@b"));
    }

    #[test]
    fn email_normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ann@X.CoM "), "ann@x.com");
    }

    #[test]
    fn otp_mail_carries_the_code_in_both_bodies() {
        let mail = otp_mail("ann@x.com", "042137");
        assert_eq!(mail.to, "ann@x.com");
        assert!(mail.text.contains("042137"));
        assert!(mail.html.contains("042137"));
        assert!(mail.text.contains("10 minutes"));
    }

    #[test]
    fn reset_mail_embeds_the_raw_token_url() {
        let url = "http://localhost:8080/auth/resetpassword/abcdef";
        let mail = reset_mail("ann@x.com", url);
        assert!(mail.text.contains(url));
        assert!(mail.html.contains(url));
    }

    #[test]
    fn verification_mail_embeds_the_link() {
        let url = "http://localhost:8080/auth/verify-email/abcdef";
        let mail = verification_mail("ann@x.com", url);
        assert!(mail.html.contains(url));
        assert!(mail.html.contains("24 hours"));
    }
}
