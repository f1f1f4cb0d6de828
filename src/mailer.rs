use std::fmt::Debug;

use color_eyre::eyre::Context;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;
use crate::types::{EmailAddr, Purpose};

/// Outbound delivery channel for challenge codes.
#[async_trait::async_trait]
pub trait Mailer: Sync + Send + Clone + Debug + 'static {
    async fn send_challenge(
        &self,
        to: &EmailAddr,
        purpose: Purpose,
        code: &str,
    ) -> color_eyre::Result<()>;
}

/// Sends challenge emails over SMTP with a per-purpose HTML template.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    platform_name: String,
}

impl Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from)
            .finish()
    }
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> color_eyre::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .wrap_err_with(|| format!("failed to create SMTP transport for {}", config.host))?
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", config.platform_name, config.username),
            platform_name: config.platform_name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send_challenge(
        &self,
        to: &EmailAddr,
        purpose: Purpose,
        code: &str,
    ) -> color_eyre::Result<()> {
        let subject = match purpose {
            Purpose::Registration => {
                format!("Welcome to {} - Verify Your Email", self.platform_name)
            }
            Purpose::Reset => "Password Reset - Verification Code".to_owned(),
        };

        let body = match purpose {
            Purpose::Registration => registration_body(&self.platform_name, code),
            Purpose::Reset => reset_body(&self.platform_name, code),
        };

        let email = Message::builder()
            .from(self.from.parse().wrap_err("invalid from address")?)
            .to(to.as_str().parse().wrap_err("invalid recipient address")?)
            .subject(subject)
            .header(lettre::message::header::ContentType::TEXT_HTML)
            .body(body)
            .wrap_err("failed to build challenge email")?;

        self.transport
            .send(email)
            .await
            .wrap_err("failed to send challenge email")?;

        info!(to = %to, purpose = %purpose, "sent challenge email");

        Ok(())
    }
}

fn registration_body(platform_name: &str, code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin: 0; padding: 0; background: #f8fafc; font-family: sans-serif;">
  <div style="max-width: 600px; margin: 40px auto; background: white; border-radius: 16px; padding: 48px 40px;">
    <h2 style="margin: 0; color: #1e293b; text-align: center;">Welcome to {platform_name}!</h2>
    <p style="color: #64748b; text-align: center;">
      You're just one step away from completing your registration.
    </p>
    <div style="background: #f8fafc; border: 2px solid #e2e8f0; border-radius: 12px; padding: 32px; text-align: center; margin: 32px 0;">
      <p style="margin: 0 0 16px 0; color: #475569;">Your Verification Code:</p>
      <div style="font-size: 40px; font-weight: 700; color: #1e40af; letter-spacing: 8px; font-family: monospace;">{code}</div>
    </div>
    <p style="color: #475569; font-size: 14px;">
      <strong>Important:</strong><br>
      &bull; Code expires in <strong style="color: #d97706;">5 minutes</strong><br>
      &bull; Use this code to complete your registration<br>
      &bull; Never share this code with anyone
    </p>
    <p style="color: #94a3b8; font-size: 14px; text-align: center;">
      If you didn't create this account, please ignore this email.
    </p>
  </div>
</body>
</html>"#
    )
}

fn reset_body(platform_name: &str, code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin: 0; padding: 0; background: #f8fafc; font-family: sans-serif;">
  <div style="max-width: 600px; margin: 40px auto; background: white; border-radius: 16px; padding: 48px 40px;">
    <h2 style="margin: 0; color: #1e293b; text-align: center;">Reset Your {platform_name} Password</h2>
    <p style="color: #64748b; text-align: center;">
      Use the verification code below to reset your password and secure your account.
    </p>
    <div style="background: #fef9c3; border: 2px solid #fbbf24; border-radius: 12px; padding: 32px; text-align: center; margin: 32px 0;">
      <p style="margin: 0 0 16px 0; color: #d97706;">Your Reset Code:</p>
      <div style="font-size: 40px; font-weight: 700; color: #d97706; letter-spacing: 8px; font-family: monospace;">{code}</div>
    </div>
    <p style="color: #92400e; font-size: 14px;">
      <strong>Security Notice</strong><br>
      &bull; This code expires in <strong>5 minutes</strong><br>
      &bull; Only use if you requested a password reset<br>
      &bull; Never share this code with anyone
    </p>
    <p style="color: #94a3b8; font-size: 14px; text-align: center;">
      If you didn't request a password reset, please ignore this email.
    </p>
  </div>
</body>
</html>"#
    )
}
