use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::auth::repo_types::{SocialLink, User};
use crate::auth::secrets;
use crate::error::ApiError;

const USER_COLUMNS: &str = "id, name, email, password_hash, photo, social_providers, \
     is_active, email_verified, last_login, referral_code, \
     reset_password_digest, reset_password_expires, \
     email_verification_digest, email_verification_expires, \
     email_verification_otp, email_verification_otp_expires, \
     created_at, updated_at";

/// Attempts at minting a unique referral code before giving up.
const REFERRAL_RETRIES: usize = 8;

/// Consumes the reset secret while installing the new password hash. The
/// digest predicate makes redemption single-use: once the secret is cleared,
/// a racing second request updates zero rows.
const CONSUME_RESET_SQL: &str = "UPDATE users SET password_hash = $2, \
         reset_password_digest = NULL, reset_password_expires = NULL, \
         updated_at = now() \
     WHERE id = $1 AND reset_password_digest = $3";

/// Unique constraints an insert can trip. The store arbitrates uniqueness;
/// the pre-check in the register handler only shapes the common-path error.
#[derive(Debug, PartialEq, Eq)]
enum InsertConflict {
    Email,
    ReferralCode,
}

fn insert_conflict(constraint: Option<&str>) -> Option<InsertConflict> {
    match constraint {
        Some("users_email_key") => Some(InsertConflict::Email),
        Some("users_referral_code_key") => Some(InsertConflict::ReferralCode),
        _ => None,
    }
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Look up the holder of an unexpired reset secret by its stored digest.
    pub async fn find_by_reset_digest(
        db: &PgPool,
        digest: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE reset_password_digest = $1 AND reset_password_expires > $2"
        ))
        .bind(digest)
        .bind(now)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_verification_digest(
        db: &PgPool,
        digest: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE email_verification_digest = $1 AND email_verification_expires > $2"
        ))
        .bind(digest)
        .bind(now)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// OTP verification is scoped to the unverified account behind the email.
    pub async fn find_unverified_by_otp(
        db: &PgPool,
        email: &str,
        otp: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE email = $1 AND email_verified = FALSE \
               AND email_verification_otp = $2 AND email_verification_otp_expires > $3"
        ))
        .bind(email)
        .bind(otp)
        .bind(now)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a new user. The referral code is assigned here, exactly once:
    /// the store's unique constraint arbitrates collisions and the insert is
    /// retried with a fresh code a bounded number of times. Two requests
    /// racing past the handler's email pre-check both reach this insert, so
    /// an email unique-violation is mapped to `Conflict` here, not `Internal`.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        photo: Option<&str>,
        providers: HashMap<String, SocialLink>,
        email_verified: bool,
    ) -> Result<User, ApiError> {
        for attempt in 1..=REFERRAL_RETRIES {
            let referral_code = secrets::mint_referral_code();
            let result = sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users \
                     (name, email, password_hash, photo, social_providers, \
                      email_verified, referral_code) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .bind(photo)
            .bind(Json(&providers))
            .bind(email_verified)
            .bind(&referral_code)
            .fetch_one(db)
            .await;

            match result {
                Ok(user) => return Ok(user),
                Err(sqlx::Error::Database(e)) => match insert_conflict(e.constraint()) {
                    Some(InsertConflict::ReferralCode) => {
                        warn!(attempt, "referral code collision, re-rolling");
                    }
                    Some(InsertConflict::Email) => {
                        warn!(email = %email, "email unique violation on insert");
                        return Err(ApiError::Conflict(
                            "User already exists with this email".into(),
                        ));
                    }
                    None => {
                        return Err(anyhow::Error::from(sqlx::Error::Database(e)).into());
                    }
                },
                Err(e) => return Err(anyhow::Error::from(e).into()),
            }
        }
        Err(ApiError::Internal(anyhow::anyhow!(
            "could not assign a unique referral code after {REFERRAL_RETRIES} attempts"
        )))
    }

    pub async fn stamp_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now(), updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Consume the reset secret and install the new password hash. Returns
    /// false when the digest was already cleared by a concurrent redemption.
    pub async fn set_password_and_clear_reset(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
        digest: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(CONSUME_RESET_SQL)
            .bind(id)
            .bind(password_hash)
            .bind(digest)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reset_secret(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_password_digest = $2, reset_password_expires = $3, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_reset_secret(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_password_digest = NULL, reset_password_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_verification_token(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verification_digest = $2, email_verification_expires = $3, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_verification_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verification_digest = NULL, email_verification_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_verification_otp(
        db: &PgPool,
        id: Uuid,
        otp: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verification_otp = $2, email_verification_otp_expires = $3, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(otp)
        .bind(expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_verification_otp(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verification_otp = NULL, email_verification_otp_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_verified_clear_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verified = TRUE, \
                 email_verification_digest = NULL, email_verification_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_verified_clear_otp(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email_verified = TRUE, \
                 email_verification_otp = NULL, email_verification_otp_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Merge one provider entry into the JSONB map. Existing entries for the
    /// same provider are left untouched by the caller's idempotency check.
    pub async fn link_provider(
        db: &PgPool,
        id: Uuid,
        provider: &str,
        link: &SocialLink,
    ) -> anyhow::Result<()> {
        let fragment = serde_json::json!({ provider: link });
        sqlx::query(
            "UPDATE users SET social_providers = social_providers || $2::jsonb, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(fragment)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Flip the active flag, returning the updated row if the user exists.
    pub async fn set_active(
        db: &PgPool,
        id: Uuid,
        is_active: bool,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_active = $2, updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Hard deletion. Reachable only from the admin surface.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_all(db: &PgPool) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    pub async fn count_active(db: &PgPool) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    pub async fn count_verified(db: &PgPool) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email_verified = TRUE")
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    pub async fn count_created_since(db: &PgPool, since: OffsetDateTime) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= $1")
            .bind(since)
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    pub async fn list_page(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             ORDER BY created_at DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_conflict_distinguishes_unique_constraints() {
        assert_eq!(
            insert_conflict(Some("users_email_key")),
            Some(InsertConflict::Email)
        );
        assert_eq!(
            insert_conflict(Some("users_referral_code_key")),
            Some(InsertConflict::ReferralCode)
        );
        assert_eq!(insert_conflict(Some("users_pkey")), None);
        assert_eq!(insert_conflict(None), None);
    }

    #[test]
    fn reset_consume_is_keyed_on_the_stored_digest() {
        assert!(CONSUME_RESET_SQL.contains("WHERE id = $1 AND reset_password_digest = $3"));
    }
}
