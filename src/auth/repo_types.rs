use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One linked social provider (google, facebook, linkedin, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialLink {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// User record in the database. Secrets stay in this struct and are never
/// serialized outward; responses are built from explicit projections.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub photo: Option<String>,
    pub social_providers: Json<HashMap<String, SocialLink>>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login: Option<OffsetDateTime>,
    pub referral_code: String,
    pub reset_password_digest: Option<String>,
    pub reset_password_expires: Option<OffsetDateTime>,
    pub email_verification_digest: Option<String>,
    pub email_verification_expires: Option<OffsetDateTime>,
    pub email_verification_otp: Option<String>,
    pub email_verification_otp_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn has_provider(&self, provider: &str) -> bool {
        self.social_providers.0.contains_key(provider)
    }
}
