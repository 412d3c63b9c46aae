//! # tollgate-types: Core types for `Tollgate`
//!
//! This crate contains shared types used across the `Tollgate` system:
//! - Record keys ([`SignupKey`], [`EventCode`], [`Version`])
//! - Identity ([`IdentityClaims`])
//! - Derived lookup keys ([`PhoneNumber`], [`PhoneHash`], [`EmailHash`])
//! - Lifecycle ([`LifecycleState`], [`ConditionKind`], [`Condition`])
//! - Provisioning hints ([`TierHints`])

use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wall-clock instant used for every timestamp in the system.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// Record Keys
// ============================================================================

/// Stable identifier of a signup record, derived from the normalized username.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignupKey(String);

impl SignupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SignupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SignupKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SignupKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for SignupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Activation code of a campaign. The code doubles as the event's record key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCode(String);

impl EventCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for EventCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque version token attached to every stored record.
///
/// A conditional write names the version it read; the store accepts the write
/// only if that version is still current.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly created record.
    pub const INITIAL: Version = Version(1);

    pub fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the version that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Claims propagated from the authentication token into the signup record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub original_sub: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub account_id: String,
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub company: String,
    /// Username requested by the identity provider; overrides the subject when
    /// deriving the signup key.
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl IdentityClaims {
    /// Returns the username the signup is registered under.
    pub fn username(&self) -> &str {
        self.preferred_username
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.sub)
    }

    /// Returns the domain part of the email claim, lowercased.
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
    }
}

// ============================================================================
// Derived Lookup Keys
// ============================================================================

/// Errors produced while normalizing a phone number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneNumberError {
    #[error("phone number contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("phone number must contain between 7 and 15 digits, got {0}")]
    InvalidLength(usize),
}

/// A phone number normalized to E.164 form (`+` followed by digits).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Minimum number of digits accepted.
    pub const MIN_DIGITS: usize = 7;
    /// Maximum number of digits allowed by E.164.
    pub const MAX_DIGITS: usize = 15;

    /// Normalizes a country code and a national number into E.164.
    ///
    /// Spaces, dashes, dots and parentheses are dropped; a leading `+` on the
    /// country code is optional.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tollgate_types::PhoneNumber;
    /// let phone = PhoneNumber::parse("+61", "408 999-999").unwrap();
    /// assert_eq!(phone.as_str(), "+61408999999");
    /// ```
    pub fn parse(country_code: &str, number: &str) -> Result<Self, PhoneNumberError> {
        let mut digits = String::with_capacity(country_code.len() + number.len());

        let country_code = country_code.trim();
        let country_code = country_code.strip_prefix('+').unwrap_or(country_code);

        for c in country_code.chars().chain(number.chars()) {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                other => return Err(PhoneNumberError::InvalidCharacter(other)),
            }
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneNumberError::InvalidLength(digits.len()));
        }

        Ok(Self(format!("+{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lookup hash for this number.
    pub fn hash(&self) -> PhoneHash {
        PhoneHash(sha256_hex(self.0.as_bytes()))
    }
}

impl Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for PhoneNumber {
    // Phone numbers are personal data; keep them out of debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhoneNumber(+***{})", &self.0[self.0.len().saturating_sub(2)..])
    }
}

/// SHA-256 (hex) of a normalized phone number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneHash(String);

impl PhoneHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PhoneHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 (hex) of a lowercased email address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailHash(String);

impl EmailHash {
    pub fn of(email: &str) -> Self {
        Self(sha256_hex(email.trim().to_ascii_lowercase().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Coarse stage of a signup, governing which operations are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    VerificationRequired,
    PendingApproval,
    Approved,
    Deactivated,
}

impl LifecycleState {
    pub fn is_active(self) -> bool {
        self != LifecycleState::Deactivated
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::VerificationRequired => "VerificationRequired",
            LifecycleState::PendingApproval => "PendingApproval",
            LifecycleState::Approved => "Approved",
            LifecycleState::Deactivated => "Deactivated",
        };
        f.write_str(name)
    }
}

/// Marker appended to a signup's condition log.
///
/// The log is append-only; the lifecycle state is a projection of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    VerificationRequired,
    VerificationCompleted,
    PendingApproval,
    ApprovedByAdmin,
    ApprovedAutomatically,
    Provisioned,
    Deactivated,
    ManuallyDeactivated,
    Reactivated,
}

impl ConditionKind {
    /// Returns the lifecycle state this marker moves the signup into, if any.
    ///
    /// Markers that only annotate the log (`Reactivated`,
    /// `VerificationCompleted`, `Provisioned`) return `None`.
    pub fn lifecycle(self) -> Option<LifecycleState> {
        match self {
            ConditionKind::VerificationRequired => Some(LifecycleState::VerificationRequired),
            ConditionKind::PendingApproval => Some(LifecycleState::PendingApproval),
            ConditionKind::ApprovedByAdmin | ConditionKind::ApprovedAutomatically => {
                Some(LifecycleState::Approved)
            }
            ConditionKind::Deactivated | ConditionKind::ManuallyDeactivated => {
                Some(LifecycleState::Deactivated)
            }
            ConditionKind::Reactivated
            | ConditionKind::VerificationCompleted
            | ConditionKind::Provisioned => None,
        }
    }
}

/// A timestamped entry in the condition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub at: Timestamp,
}

impl Condition {
    pub fn new(kind: ConditionKind, at: Timestamp) -> Self {
        Self { kind, at }
    }
}

// ============================================================================
// Provisioning Hints
// ============================================================================

/// Tier placement copied from an activation event onto a signup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHints {
    pub user_tier: String,
    pub space_tier: String,
}
