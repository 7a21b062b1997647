use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, to: &str, token: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, base_url: &str) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("smtp relay")?
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
            .build();
        Ok(Self {
            transport,
            from: config.from.parse().context("parse SMTP_FROM address")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let verification_url = format!("{}/auth/verify?token={}", self.base_url, token);
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1>Welcome to Recalls!</h1>
  <p>Thanks for signing up. To complete your registration, please verify your
  email address by clicking the link below.</p>
  <p><a href="{url}">Verify email address</a></p>
  <p>If the link doesn't work, copy and paste this into your browser:</p>
  <p>{url}</p>
  <p style="color: #999; font-size: 14px;">This link expires in 24 hours. If you
  didn't create an account, you can safely ignore this email.</p>
</div>"#,
            url = verification_url
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("parse recipient address")?)
            .subject("Verify your email address - Recalls")
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("build verification email")?;

        self.transport
            .send(message)
            .await
            .context("smtp send verification email")?;
        info!(%to, "verification email sent");
        Ok(())
    }
}
