use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Bot-verification collaborator. The gate only cares about valid/invalid;
/// everything about how tokens are minted and checked stays behind this
/// trait, which also keeps the gate testable without the network.
#[async_trait]
pub trait BotVerifier: Send + Sync {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool>;
}

/// Cloudflare Turnstile implementation.
pub struct TurnstileVerifier {
    http: reqwest::Client,
    secret_key: String,
}

impl TurnstileVerifier {
    pub fn new(secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[async_trait]
impl BotVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool> {
        if self.secret_key.is_empty() {
            // No key configured (dev environment): pass tokens through.
            tracing::warn!("Turnstile secret key not configured; skipping verification");
            return Ok(true);
        }

        let mut form = vec![
            ("secret", self.secret_key.as_str()),
            ("response", token),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .http
            .post(SITEVERIFY_URL)
            .form(&form)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .context("Turnstile siteverify request failed")?;

        let body: SiteverifyResponse = response
            .json()
            .await
            .context("Failed to decode Turnstile siteverify response")?;

        if !body.success {
            tracing::warn!(
                "Turnstile rejected token: error_codes={:?}",
                body.error_codes
            );
        }

        Ok(body.success)
    }
}
