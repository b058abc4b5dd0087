use chrono::{DateTime, Utc};

use crate::config::SecurityConfig;
use crate::error::ApiError;
use crate::metrics::record_abuse_rejection;

use super::turnstile_service::BotVerifier;

/// Server-side anti-abuse checks, run after payload validation and before
/// anything is written. Configuration and the verification collaborator
/// are injected; the gate holds no state of its own.
///
/// Every rejection surfaces as the same generic `AbuseRejected`; which
/// check failed, and any threshold, stays server-side (the per-reason
/// metric labels are internal).
pub struct AbuseGate<'a> {
    security: &'a SecurityConfig,
    verifier: &'a dyn BotVerifier,
}

impl<'a> AbuseGate<'a> {
    pub fn new(security: &'a SecurityConfig, verifier: &'a dyn BotVerifier) -> Self {
        Self { security, verifier }
    }

    /// Runs the token check, then the fill-time heuristic. On success,
    /// returns the fill duration in seconds when the client reported a
    /// start timestamp.
    pub async fn check(
        &self,
        token: Option<&str>,
        started_at: Option<f64>,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, ApiError> {
        if self.security.turnstile_enabled {
            let Some(token) = token.filter(|t| !t.is_empty()) else {
                tracing::warn!("Submission rejected: missing bot-verification token");
                record_abuse_rejection("missing_token");
                return Err(ApiError::AbuseRejected);
            };

            let valid = self
                .verifier
                .verify(token, client_ip)
                .await
                .map_err(ApiError::Internal)?;
            if !valid {
                tracing::warn!("Submission rejected: bot-verification token invalid");
                record_abuse_rejection("bot_check");
                return Err(ApiError::AbuseRejected);
            }
        }

        check_fill_time(self.security, started_at, now)
    }
}

/// Fill-time heuristic. Without a client-reported start there is nothing
/// to measure and the check is skipped.
fn check_fill_time(
    security: &SecurityConfig,
    started_at: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Option<f64>, ApiError> {
    let Some(started) = started_at else {
        return Ok(None);
    };

    let elapsed = now.timestamp_millis() as f64 / 1000.0 - started;
    if security.time_check_enabled && elapsed < security.min_fill_seconds as f64 {
        tracing::warn!("Submission rejected: filled in {:.1}s", elapsed);
        record_abuse_rejection("fill_time");
        return Err(ApiError::AbuseRejected);
    }

    Ok(Some(elapsed.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct StubVerifier {
        accept: bool,
    }

    #[async_trait]
    impl BotVerifier for StubVerifier {
        async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> Result<bool> {
            Ok(self.accept)
        }
    }

    fn security(turnstile: bool, time_check: bool, min_fill_seconds: u32) -> SecurityConfig {
        SecurityConfig {
            turnstile_enabled: turnstile,
            turnstile_secret_key: "key".to_string(),
            time_check_enabled: time_check,
            min_fill_seconds,
            rate_limit_enabled: false,
            max_submissions_per_day: 2,
        }
    }

    fn started_seconds_ago(now: DateTime<Utc>, secs: f64) -> Option<f64> {
        Some(now.timestamp_millis() as f64 / 1000.0 - secs)
    }

    #[tokio::test]
    async fn too_fast_submission_is_rejected() {
        let cfg = security(false, true, 3);
        let verifier = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &verifier);

        let now = Utc::now();
        let result = gate.check(None, started_seconds_ago(now, 1.0), None, now).await;
        assert!(matches!(result, Err(ApiError::AbuseRejected)));
    }

    #[tokio::test]
    async fn rejection_reason_stays_opaque() {
        let cfg = security(false, true, 3);
        let verifier = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &verifier);

        let now = Utc::now();
        let err = gate
            .check(None, started_seconds_ago(now, 1.0), None, now)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains('3'));
        assert!(!msg.to_lowercase().contains("second"));
        assert!(!msg.to_lowercase().contains("time"));
    }

    #[tokio::test]
    async fn slow_enough_submission_passes_with_duration() {
        let cfg = security(false, true, 3);
        let verifier = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &verifier);

        let now = Utc::now();
        let duration = gate
            .check(None, started_seconds_ago(now, 42.0), None, now)
            .await
            .unwrap()
            .unwrap();
        assert!((duration - 42.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn missing_start_skips_the_time_check() {
        let cfg = security(false, true, 3);
        let verifier = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &verifier);

        let result = gate.check(None, None, None, Utc::now()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn missing_token_rejected_when_turnstile_enabled() {
        let cfg = security(true, false, 3);
        let verifier = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &verifier);

        let result = gate.check(None, None, None, Utc::now()).await;
        assert!(matches!(result, Err(ApiError::AbuseRejected)));

        let result = gate.check(Some(""), None, None, Utc::now()).await;
        assert!(matches!(result, Err(ApiError::AbuseRejected)));
    }

    #[tokio::test]
    async fn invalid_token_rejected_valid_token_passes() {
        let cfg = security(true, false, 3);

        let rejecting = StubVerifier { accept: false };
        let gate = AbuseGate::new(&cfg, &rejecting);
        let result = gate.check(Some("tok"), None, None, Utc::now()).await;
        assert!(matches!(result, Err(ApiError::AbuseRejected)));

        let accepting = StubVerifier { accept: true };
        let gate = AbuseGate::new(&cfg, &accepting);
        assert!(gate.check(Some("tok"), None, None, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn token_ignored_when_turnstile_disabled() {
        let cfg = security(false, false, 3);
        let verifier = StubVerifier { accept: false };
        let gate = AbuseGate::new(&cfg, &verifier);

        assert!(gate.check(None, None, None, Utc::now()).await.is_ok());
    }
}
