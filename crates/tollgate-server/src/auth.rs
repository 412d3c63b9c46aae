//! Bearer token authentication.
//!
//! Every route expects an HS256 JWT in the `Authorization` header. The token
//! carries the identity claims a signup is created from and, for operators,
//! the `admin` role.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use tollgate::IdentityClaims;
use tollgate_config::AuthConfig;

/// Role granting access to the administrative routes.
pub const ADMIN_ROLE: &str = "admin";

/// JWT configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing/verifying tokens.
    secret: String,
    /// Lifetime of issued tokens.
    pub expiration: Duration,
    pub issuer: String,
    /// Checked only when set.
    pub audience: Option<String>,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expiration: Duration::from_secs(3600),
            issuer: "tollgate".to_string(),
            audience: None,
        }
    }

    #[must_use]
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        let jwt = JwtConfig::new(config.secret.clone())
            .with_expiration(Duration::from_secs(config.token_ttl_secs))
            .with_issuer(config.issuer.clone());
        match &config.audience {
            Some(audience) => jwt.with_audience(audience.clone()),
            None => jwt,
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub original_sub: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiration (seconds since epoch).
    pub exp: u64,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl TokenClaims {
    /// The identity a signup is created from.
    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims {
            sub: self.sub.clone(),
            original_sub: self.original_sub.clone(),
            user_id: self.user_id.clone(),
            account_id: self.account_id.clone(),
            email: self.email.clone(),
            given_name: self.given_name.clone(),
            family_name: self.family_name.clone(),
            company: self.company.clone(),
            preferred_username: self.preferred_username.clone(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Why a request was not authenticated.
///
/// The messages are part of the HTTP contract.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token found")]
    MissingToken,

    #[error("token contains an invalid number of segments")]
    MalformedToken,

    #[error("token is expired by {0}")]
    Expired(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Validates and issues bearer tokens.
pub struct AuthService {
    config: JwtConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        match &config.audience {
            Some(audience) => {
                validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
                validation.set_audience(&[audience.as_str()]);
            }
            None => {
                validation.set_required_spec_claims(&["exp", "sub", "iss"]);
                validation.validate_aud = false;
            }
        }

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Authenticates the value of an `Authorization` header.
    pub fn authenticate(&self, header: Option<&str>) -> Result<TokenClaims, AuthError> {
        let token = header
            .and_then(|value| {
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        if token.split('.').count() != 3 {
            return Err(AuthError::MalformedToken);
        }

        match decode::<TokenClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) if matches!(err.kind(), JwtErrorKind::ExpiredSignature) => {
                Err(AuthError::Expired(self.expired_by(token)))
            }
            Err(err) => Err(AuthError::Invalid(err.to_string())),
        }
    }

    /// How long ago a validly signed but expired token ran out.
    fn expired_by(&self, token: &str) -> String {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        let elapsed = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| get_current_timestamp().saturating_sub(data.claims.exp))
            .unwrap_or_default();
        format_elapsed(elapsed)
    }

    /// Builds claims for `identity` issued at `issued_at`.
    pub fn claims(
        &self,
        identity: &IdentityClaims,
        roles: Vec<String>,
        issued_at: u64,
    ) -> TokenClaims {
        TokenClaims {
            sub: identity.sub.clone(),
            original_sub: identity.original_sub.clone(),
            user_id: identity.user_id.clone(),
            account_id: identity.account_id.clone(),
            email: identity.email.clone(),
            given_name: identity.given_name.clone(),
            family_name: identity.family_name.clone(),
            company: identity.company.clone(),
            preferred_username: identity.preferred_username.clone(),
            roles,
            iat: issued_at,
            exp: issued_at + self.config.expiration.as_secs(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        }
    }

    /// Issues a token for `identity`, valid from now.
    pub fn issue(
        &self,
        identity: &IdentityClaims,
        roles: Vec<String>,
    ) -> Result<String, AuthError> {
        self.sign(&self.claims(identity, roles, get_current_timestamp()))
    }

    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }
}

/// Formats seconds as `1h2m3s`, omitting leading zero units.
fn format_elapsed(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
