//! Human verification for public lookups.
//!
//! [`RecaptchaVerifier`] posts the client token to a reCAPTCHA-compatible
//! `siteverify` endpoint. Without a configured secret, verification is
//! disabled and every request passes with status `disabled`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use verity_core::{ConfigError, VerificationError};

pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Result of a verification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Passed { score: Option<f64> },
    /// No verifier configured.
    Disabled,
    Rejected { score: Option<f64> },
    /// The verification service could not be reached or answered garbage.
    Error { reason: String },
}

impl VerificationOutcome {
    /// Value recorded in `search_logs.verification_status`.
    pub fn status(&self) -> &'static str {
        match self {
            VerificationOutcome::Passed { .. } => "passed",
            VerificationOutcome::Disabled => "disabled",
            VerificationOutcome::Rejected { .. } => "rejected",
            VerificationOutcome::Error { .. } => "error",
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            VerificationOutcome::Passed { score } | VerificationOutcome::Rejected { score } => {
                *score
            }
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<(), VerificationError> {
        match self {
            VerificationOutcome::Passed { .. } | VerificationOutcome::Disabled => Ok(()),
            VerificationOutcome::Rejected { score } => Err(VerificationError::Rejected { score }),
            VerificationOutcome::Error { reason } => Err(VerificationError::Upstream { reason }),
        }
    }
}

#[async_trait]
pub trait HumanVerifier: Send + Sync {
    async fn verify(&self, token: Option<&str>, client_address: &str) -> VerificationOutcome;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Server-side secret; `None` disables verification.
    pub secret: Option<SecretString>,
    pub verify_url: String,
    /// Lowest accepted score for score-based (v3) tokens.
    pub min_score: f64,
    pub timeout: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            secret: None,
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            min_score: 0.5,
            timeout: Duration::from_secs(5),
        }
    }
}

impl VerificationConfig {
    /// # Environment Variables
    /// - `VERITY_CAPTCHA_SECRET`
    /// - `VERITY_CAPTCHA_VERIFY_URL`
    /// - `VERITY_CAPTCHA_MIN_SCORE` (default: 0.5)
    /// - `VERITY_CAPTCHA_TIMEOUT_SECS` (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            secret: std::env::var("VERITY_CAPTCHA_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(SecretString::from),
            verify_url: std::env::var("VERITY_CAPTCHA_VERIFY_URL")
                .unwrap_or(defaults.verify_url),
            min_score: std::env::var("VERITY_CAPTCHA_MIN_SCORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_score),
            timeout: std::env::var("VERITY_CAPTCHA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Production deployments must configure a secret.
    pub fn validate_for_production(&self, environment: &str) -> Result<(), ConfigError> {
        let environment = environment.to_lowercase();
        if !self.is_enabled() {
            if environment == "production" || environment == "prod" {
                return Err(ConfigError::MissingRequired {
                    field: "VERITY_CAPTCHA_SECRET".to_string(),
                });
            }
            tracing::warn!("Human verification disabled: VERITY_CAPTCHA_SECRET is not set");
        }
        Ok(())
    }
}

// ============================================================================
// VERIFIERS
// ============================================================================

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// reCAPTCHA-compatible verifier.
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    config: VerificationConfig,
}

impl RecaptchaVerifier {
    pub fn new(config: VerificationConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "captcha_http_client".to_string(),
                value: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn judge(&self, response: SiteVerifyResponse) -> VerificationOutcome {
        let score_ok = response
            .score
            .map_or(true, |score| score >= self.config.min_score);
        if response.success && score_ok {
            VerificationOutcome::Passed {
                score: response.score,
            }
        } else {
            tracing::info!(
                score = ?response.score,
                errors = ?response.error_codes,
                "Human verification rejected"
            );
            VerificationOutcome::Rejected {
                score: response.score,
            }
        }
    }
}

#[async_trait]
impl HumanVerifier for RecaptchaVerifier {
    async fn verify(&self, token: Option<&str>, client_address: &str) -> VerificationOutcome {
        let Some(secret) = self.config.secret.as_ref() else {
            return VerificationOutcome::Disabled;
        };
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return VerificationOutcome::Rejected { score: None };
        };

        let form = [
            ("secret", secret.expose_secret()),
            ("response", token),
            ("remoteip", client_address),
        ];
        let result = self
            .client
            .post(&self.config.verify_url)
            .form(&form)
            .send()
            .await;

        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Verification service returned non-2xx");
                return VerificationOutcome::Error {
                    reason: format!("siteverify status {}", response.status()),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Verification service unreachable");
                return VerificationOutcome::Error {
                    reason: e.to_string(),
                };
            }
        };

        match response.json::<SiteVerifyResponse>().await {
            Ok(body) => self.judge(body),
            Err(e) => VerificationOutcome::Error {
                reason: format!("invalid siteverify response: {e}"),
            },
        }
    }
}

/// Verifier that always answers with a fixed outcome.
#[derive(Debug, Clone)]
pub struct StaticVerifier(pub VerificationOutcome);

impl StaticVerifier {
    pub fn disabled() -> Self {
        Self(VerificationOutcome::Disabled)
    }
}

#[async_trait]
impl HumanVerifier for StaticVerifier {
    async fn verify(&self, _token: Option<&str>, _client_address: &str) -> VerificationOutcome {
        self.0.clone()
    }
}

/// Verifier for a configuration: remote when a secret is set, else disabled.
pub fn build_verifier(config: VerificationConfig) -> Result<Arc<dyn HumanVerifier>, ConfigError> {
    if config.is_enabled() {
        Ok(Arc::new(RecaptchaVerifier::new(config)?))
    } else {
        Ok(Arc::new(StaticVerifier::disabled()))
    }
}
