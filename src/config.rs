use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Session cookie settings. The cookie mirrors the bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub ttl_days: i64,
    pub secure: bool,
}

/// Mail relay settings. `endpoint` unset means outbound mail is discarded
/// (logged only), which suits local development.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub endpoint: Option<String>,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public origin used when building reset/verification links in emails.
    pub base_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url =
            std::env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let production = std::env::var("APP_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "keygate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "keygate-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };
        let cookie = CookieConfig {
            ttl_days: std::env::var("COOKIE_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
            secure: production,
        };
        let mail = MailConfig {
            endpoint: std::env::var("MAIL_RELAY_URL").ok(),
            api_key: std::env::var("MAIL_RELAY_KEY").unwrap_or_default(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@keygate.local".into()),
        };
        Ok(Self {
            database_url,
            base_url,
            jwt,
            cookie,
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Process env is global, so every from_env assertion lives in one test
    // to keep the suite parallel-safe.
    #[test]
    fn from_env_defaults_and_production_toggle() {
        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "APP_BASE_URL",
            "APP_ENV",
            "JWT_ISSUER",
            "JWT_AUDIENCE",
            "JWT_TTL_MINUTES",
            "COOKIE_TTL_DAYS",
            "MAIL_RELAY_URL",
            "MAIL_RELAY_KEY",
            "MAIL_FROM",
        ] {
            std::env::remove_var(key);
        }

        // Required settings have no default.
        assert!(AppConfig::from_env().is_err());

        std::env::set_var("DATABASE_URL", "postgres://postgres@localhost/keygate");
        std::env::set_var("JWT_SECRET", "test-secret");

        let config = AppConfig::from_env().expect("required vars set");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.jwt.issuer, "keygate");
        assert_eq!(config.jwt.audience, "keygate-users");
        assert_eq!(config.jwt.ttl_minutes, 60 * 24 * 7);
        assert_eq!(config.cookie.ttl_days, 7);
        assert!(!config.cookie.secure);
        assert!(config.mail.endpoint.is_none());
        assert_eq!(config.mail.from, "no-reply@keygate.local");

        std::env::set_var("APP_ENV", "production");
        std::env::set_var("JWT_TTL_MINUTES", "30");
        std::env::set_var("COOKIE_TTL_DAYS", "1");
        std::env::set_var("MAIL_RELAY_URL", "https://relay.example/send");

        let config = AppConfig::from_env().expect("required vars set");
        assert!(config.cookie.secure);
        assert_eq!(config.jwt.ttl_minutes, 30);
        assert_eq!(config.cookie.ttl_days, 1);
        assert_eq!(config.mail.endpoint.as_deref(), Some("https://relay.example/send"));

        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "APP_ENV",
            "JWT_TTL_MINUTES",
            "COOKIE_TTL_DAYS",
            "MAIL_RELAY_URL",
        ] {
            std::env::remove_var(key);
        }
    }
}
