use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "dev-secret-key-change-in-production".into()),
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "userhub".into()),
            audience: std::env::var("SESSION_AUDIENCE")
                .unwrap_or_else(|_| "userhub-session".into()),
            // Permanent cookie, 31 days
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 31),
        };
        Ok(Self {
            database_url,
            session,
        })
    }
}
