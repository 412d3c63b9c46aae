//! Commands accepted by the kernel.

use std::fmt::Debug;

use subtle::ConstantTimeEq;
use tollgate_types::{
    EventCode, IdentityClaims, PhoneNumber, SignupKey, TierHints, Timestamp, sha256_hex,
};

use crate::activation::ActivationRejection;

/// A command to apply to a signup record.
///
/// Commands carry everything the kernel needs that is not already on the
/// record. Anything nondeterministic (the code itself, expiry instants) is
/// produced by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========================================================================
    // Intake
    // ========================================================================
    /// Create a new record or reactivate a deactivated one.
    Intake {
        key: SignupKey,
        claims: IdentityClaims,
        /// Whether the claim set must pass verification before approval.
        verification_required: bool,
    },

    // ========================================================================
    // Verification
    // ========================================================================
    /// Store a freshly generated phone verification code.
    IssueCode {
        phone: PhoneNumber,
        code: VerificationCode,
        expires_at: Timestamp,
    },

    /// Check a code supplied by the user against the outstanding one.
    CheckCode { code: VerificationCode },

    /// Count a failed activation-code redemption against the signup.
    RecordFailedAttempt { reason: ActivationRejection },

    /// Attach an accepted activation event, completing verification.
    AttachEvent { event: EventCode, tiers: TierHints },

    // ========================================================================
    // Administration
    // ========================================================================
    Approve {
        manual: bool,
        target_cluster: Option<String>,
    },

    Deactivate { manual: bool },

    /// Downstream provisioning write-back.
    MarkProvisioned { compliant_username: String },
}

impl Command {
    /// Short name used in logs and transition errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Intake { .. } => "intake",
            Command::IssueCode { .. } => "issue-code",
            Command::CheckCode { .. } => "check-code",
            Command::RecordFailedAttempt { .. } => "record-failed-attempt",
            Command::AttachEvent { .. } => "attach-event",
            Command::Approve { .. } => "approve",
            Command::Deactivate { .. } => "deactivate",
            Command::MarkProvisioned { .. } => "mark-provisioned",
        }
    }
}

// ============================================================================
// Verification Code
// ============================================================================

/// A plaintext verification code.
///
/// Only ever held in memory between generation and delivery, or between the
/// request body and the check. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 (hex) of the code, the only form that is persisted.
    pub fn hash(&self) -> String {
        sha256_hex(self.0.trim().as_bytes())
    }

    /// Compares against a stored hash in constant time.
    pub fn matches_hash(&self, stored: &str) -> bool {
        self.hash().as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

impl Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VerificationCode(<redacted>)")
    }
}
