use std::fmt::Debug;

use serde::Serialize;
use tracing::info;

use crate::config::IdentityConfig;
use crate::types::EmailAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The provider has no account for the email.
    UserNotFound,
    Provider(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserNotFound => f.write_str("User not found"),
            Self::Provider(message) => write!(f, "identity provider error: {message}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// External identity provider that owns user credentials.
#[async_trait::async_trait]
pub trait IdentityProvider: Sync + Send + Clone + Debug + 'static {
    async fn set_password(
        &self,
        email: &EmailAddr,
        new_password: &str,
    ) -> Result<(), IdentityError>;
}

/// Credential updates over the provider's REST admin API.
#[derive(Debug, Clone)]
pub struct RestIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SetPasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[async_trait::async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn set_password(
        &self,
        email: &EmailAddr,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let url = format!("{}/admin/users/password", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SetPasswordRequest {
                email: email.as_str(),
                password: new_password,
            })
            .send()
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::UserNotFound);
        }

        if !response.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "unexpected status: {}",
                response.status()
            )));
        }

        info!(email = %email, "updated credential at identity provider");

        Ok(())
    }
}
