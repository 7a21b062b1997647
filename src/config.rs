use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model used for bulk generation and worksheets.
    pub model: String,
    /// Smaller model used for single-term completion.
    pub completion_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public base URL of the app, used in verification links.
    pub base_url: String,
    /// Origin allowed to read anonymous sets cross-origin.
    pub embed_origin: String,
    /// Advisory flashcard lock lease, in seconds.
    pub lock_ttl_seconds: u64,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "recalls".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "recalls-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST")?,
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            user: std::env::var("SMTP_USER")?,
            pass: std::env::var("SMTP_PASS")?,
            from: std::env::var("SMTP_FROM").or_else(|_| std::env::var("SMTP_USER"))?,
        };
        let ai = AiConfig {
            base_url: std::env::var("AI_BASE_URL")
                .unwrap_or_else(|_| "https://api.cohere.ai/compatibility/v1".into()),
            api_key: std::env::var("AI_API_KEY")?,
            model: std::env::var("AI_MODEL").unwrap_or_else(|_| "command-r-plus".into()),
            completion_model: std::env::var("AI_COMPLETION_MODEL")
                .unwrap_or_else(|_| "command-r".into()),
        };
        Ok(Self {
            database_url,
            base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            embed_origin: std::env::var("EMBED_ORIGIN")
                .unwrap_or_else(|_| "https://www.notate.sh".into()),
            lock_ttl_seconds: std::env::var("LOCK_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(90),
            jwt,
            smtp,
            ai,
        })
    }
}
