//! JWT utilities for token generation and validation
//!
//! Tokens are signed with HS256 and a process-wide secret. Access and refresh
//! tokens share one claim set; the only difference between them is the
//! expiry. The refresh token string is also the opaque value whose SHA-256
//! digest is stored server side.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer claim carried by every token
pub const ISSUER: &str = "gdsi api";

/// Audience claim carried by every token
pub const AUDIENCE: &str = "gdsi app";

/// Default access token lifetime (15 minutes)
const ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 15;

/// Default refresh token lifetime (30 days)
const REFRESH_TOKEN_LIFETIME_HOURS: i64 = 720;

/// Allowed clock skew when checking `nbf` and `exp`, in seconds
const DEFAULT_LEEWAY_SECS: u64 = 5;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token lifetime
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    pub refresh_token_lifetime: Duration,
    /// Clock skew tolerated by `decode`
    pub leeway_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration with default lifetimes
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_lifetime: Duration::minutes(ACCESS_TOKEN_LIFETIME_MINUTES),
            refresh_token_lifetime: Duration::hours(REFRESH_TOKEN_LIFETIME_HOURS),
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Set access token lifetime
    pub fn access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Set refresh token lifetime
    pub fn refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    /// Set tolerated clock skew
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    Immature,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::ImmatureSignature => JwtError::Immature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwtError::InvalidToken,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => JwtError::InvalidClaims(err.to_string()),
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Subject (account ID)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Account role
    pub role: String,
    /// Player profile linked to the account
    pub player_id: Uuid,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

impl Claims {
    /// Claims for `account_id` valid from `now` for `lifetime`
    pub fn new(
        account_id: Uuid,
        role: impl Into<String>,
        player_id: Uuid,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            iss: ISSUER.to_string(),
            sub: account_id.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            role: role.into(),
            player_id,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Get account ID as UUID
    pub fn account_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
    /// When both tokens were minted
    pub issued_at: DateTime<Utc>,
    /// Access token expiration
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration
    pub refresh_expires_at: DateTime<Utc>,
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = config.leeway_secs;

        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a claim set
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    /// Verify signature, issuer, audience and the temporal claims
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Mint an access/refresh pair sharing subject, role and player
    pub fn generate_token_pair(
        &self,
        account_id: Uuid,
        role: &str,
        player_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, JwtError> {
        let access_expires_at = now + self.config.access_token_lifetime;
        let refresh_expires_at = now + self.config.refresh_token_lifetime;

        let access_claims = Claims::new(
            account_id,
            role,
            player_id,
            now,
            self.config.access_token_lifetime,
        );
        let refresh_claims = Claims::new(
            account_id,
            role,
            player_id,
            now,
            self.config.refresh_token_lifetime,
        );

        Ok(TokenPair {
            access_token: self.encode(&access_claims)?,
            refresh_token: self.encode(&refresh_claims)?,
            issued_at: now,
            access_expires_at,
            refresh_expires_at,
        })
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        self.config.refresh_token_lifetime
    }
}
