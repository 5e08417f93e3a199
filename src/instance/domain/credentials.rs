//! Secrets and signed API tokens for one instance.
//!
//! Tokens are HS256 JWTs in compact form. Both tokens of an instance are
//! signed with the instance's own signing secret, which comes from a secure
//! entropy source and is never derived from the instance identifier.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Issuer claim written into every token.
pub const TOKEN_ISSUER: &str = "supabase";

/// Token lifetime: one hundred years, for practical non-expiry.
const TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 24 * 365 * 100;

const SIGNING_SECRET_BYTES: usize = 64;
const POSTGRES_PASSWORD_BYTES: usize = 32;
const DASHBOARD_PASSWORD_BYTES: usize = 24;
const SECRET_KEY_BASE_BYTES: usize = 64;
const VAULT_KEY_BYTES: usize = 32;
const LOGFLARE_TOKEN_BYTES: usize = 32;

/// Source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fills `destination` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Entropy`] when the source cannot produce
    /// bytes.
    fn fill(&self, destination: &mut [u8]) -> Result<(), CredentialError>;
}

/// Errors raised while generating or validating credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The entropy source failed.
    #[error("secure random source failed: {0}")]
    Entropy(String),

    /// Token signing failed.
    #[error("failed to sign {role} token: {reason}")]
    Signing {
        /// Role of the token being signed.
        role: TokenRole,
        /// Underlying failure.
        reason: String,
    },

    /// The token is malformed, expired, or its signature does not verify.
    #[error("token rejected: {0}")]
    InvalidToken(String),

    /// The token verified but carries an unexpected role claim.
    #[error("token role mismatch: expected {expected}, found {actual}")]
    RoleMismatch {
        /// Role the caller expected.
        expected: TokenRole,
        /// Role found in the claims.
        actual: TokenRole,
    },
}

/// Role claim carried by an API token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    /// Low-privilege public access.
    Anon,
    /// Full access that bypasses row-level security.
    ServiceRole,
}

impl TokenRole {
    /// Returns the canonical claim value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anon => "anon",
            Self::ServiceRole => "service_role",
        }
    }
}

impl fmt::Display for TokenRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Claims carried by an API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Role granted by the token.
    pub role: TokenRole,
    /// Issuer; always [`TOKEN_ISSUER`] for minted tokens.
    pub iss: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Secret used to sign and verify the tokens of one instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Generates a fresh signing secret from `entropy`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Entropy`] when the source fails.
    pub fn generate(entropy: &impl EntropySource) -> Result<Self, CredentialError> {
        random_token(entropy, SIGNING_SECRET_BYTES).map(Self)
    }

    /// Returns the printable secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SigningSecret(<redacted>)")
    }
}

/// The anon and service-role tokens signed with one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokens {
    /// Token with the `anon` role.
    pub anon_key: String,
    /// Token with the `service_role` role.
    pub service_role_key: String,
}

/// Mints the anon and service-role tokens for `secret`.
///
/// # Errors
///
/// Returns [`CredentialError::Signing`] when encoding fails.
pub fn mint_tokens(
    secret: &SigningSecret,
    issued_at: DateTime<Utc>,
) -> Result<ApiTokens, CredentialError> {
    Ok(ApiTokens {
        anon_key: sign(secret, TokenRole::Anon, issued_at)?,
        service_role_key: sign(secret, TokenRole::ServiceRole, issued_at)?,
    })
}

/// Decodes `token`, verifies its signature, issuer, and expiry, and checks
/// that it carries `expected_role`.
///
/// # Errors
///
/// Returns [`CredentialError::InvalidToken`] when decoding or verification
/// fails and [`CredentialError::RoleMismatch`] for a different role.
pub fn validate_token(
    token: &str,
    secret: &SigningSecret,
    expected_role: TokenRole,
) -> Result<TokenClaims, CredentialError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss"]);

    let data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.expose().as_bytes()),
        &validation,
    )
    .map_err(|error| CredentialError::InvalidToken(error.to_string()))?;

    if data.claims.role != expected_role {
        return Err(CredentialError::RoleMismatch {
            expected: expected_role,
            actual: data.claims.role,
        });
    }
    Ok(data.claims)
}

fn sign(
    secret: &SigningSecret,
    role: TokenRole,
    issued_at: DateTime<Utc>,
) -> Result<String, CredentialError> {
    let iat = issued_at.timestamp();
    let claims = TokenClaims {
        role,
        iss: TOKEN_ISSUER.to_owned(),
        iat,
        exp: iat + TOKEN_LIFETIME_SECS,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose().as_bytes()),
    )
    .map_err(|error| CredentialError::Signing {
        role,
        reason: error.to_string(),
    })
}

fn random_bytes(
    entropy: &impl EntropySource,
    length: usize,
) -> Result<Vec<u8>, CredentialError> {
    let mut bytes = vec![0_u8; length];
    entropy.fill(&mut bytes)?;
    Ok(bytes)
}

fn random_token(entropy: &impl EntropySource, length: usize) -> Result<String, CredentialError> {
    random_bytes(entropy, length).map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
}

/// Every secret the stack needs for one instance.
///
/// Generated once at creation and never changed afterwards; rotating
/// credentials means deleting and recreating the instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCredentials {
    jwt_secret: SigningSecret,
    anon_key: String,
    service_role_key: String,
    postgres_password: String,
    dashboard_password: String,
    secret_key_base: String,
    vault_enc_key: String,
    logflare_public_token: String,
    logflare_private_token: String,
}

impl InstanceCredentials {
    /// Generates a complete credential set.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when the entropy source fails or token
    /// signing fails.
    pub fn generate(
        entropy: &impl EntropySource,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, CredentialError> {
        let jwt_secret = SigningSecret::generate(entropy)?;
        let tokens = mint_tokens(&jwt_secret, issued_at)?;

        Ok(Self {
            jwt_secret,
            anon_key: tokens.anon_key,
            service_role_key: tokens.service_role_key,
            postgres_password: random_token(entropy, POSTGRES_PASSWORD_BYTES)?,
            dashboard_password: random_token(entropy, DASHBOARD_PASSWORD_BYTES)?,
            secret_key_base: random_token(entropy, SECRET_KEY_BASE_BYTES)?,
            vault_enc_key: URL_SAFE.encode(random_bytes(entropy, VAULT_KEY_BYTES)?),
            logflare_public_token: random_token(entropy, LOGFLARE_TOKEN_BYTES)?,
            logflare_private_token: random_token(entropy, LOGFLARE_TOKEN_BYTES)?,
        })
    }

    /// Checks that both tokens verify against the signing secret with the
    /// expected roles.
    ///
    /// # Errors
    ///
    /// Returns the first [`CredentialError`] raised by [`validate_token`].
    pub fn verify(&self) -> Result<(), CredentialError> {
        validate_token(&self.anon_key, &self.jwt_secret, TokenRole::Anon)?;
        validate_token(
            &self.service_role_key,
            &self.jwt_secret,
            TokenRole::ServiceRole,
        )?;
        Ok(())
    }

    /// Returns the signing secret.
    #[must_use]
    pub const fn jwt_secret(&self) -> &SigningSecret {
        &self.jwt_secret
    }

    /// Returns the anon token.
    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Returns the service-role token.
    #[must_use]
    pub fn service_role_key(&self) -> &str {
        &self.service_role_key
    }

    /// Returns the database superuser password.
    #[must_use]
    pub fn postgres_password(&self) -> &str {
        &self.postgres_password
    }

    /// Returns the dashboard basic-auth password.
    #[must_use]
    pub fn dashboard_password(&self) -> &str {
        &self.dashboard_password
    }

    /// Returns the realtime/pooler secret key base.
    #[must_use]
    pub fn secret_key_base(&self) -> &str {
        &self.secret_key_base
    }

    /// Returns the vault encryption key.
    #[must_use]
    pub fn vault_enc_key(&self) -> &str {
        &self.vault_enc_key
    }

    /// Returns the analytics public access token.
    #[must_use]
    pub fn logflare_public_token(&self) -> &str {
        &self.logflare_public_token
    }

    /// Returns the analytics private access token.
    #[must_use]
    pub fn logflare_private_token(&self) -> &str {
        &self.logflare_private_token
    }

    #[cfg(test)]
    pub(crate) fn with_service_role_key(mut self, token: impl Into<String>) -> Self {
        self.service_role_key = token.into();
        self
    }
}

impl fmt::Debug for InstanceCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InstanceCredentials")
            .field("jwt_secret", &self.jwt_secret)
            .finish_non_exhaustive()
    }
}
