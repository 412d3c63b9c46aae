//! Signup record state.
//!
//! A record carries the identity claims, the append-only condition log and the
//! verification sub-record. The lifecycle state is never stored: it is folded
//! from the condition log on demand, so the two cannot disagree.
//!
//! Like the kernel itself, record mutators take ownership of `self` and return
//! the updated record.

use serde::{Deserialize, Serialize};
use tollgate_types::{
    Condition, ConditionKind, EmailHash, EventCode, IdentityClaims, LifecycleState, PhoneHash,
    SignupKey, TierHints, Timestamp,
};

// ============================================================================
// Verification Sub-record
// ============================================================================

/// An issued, not yet consumed verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCode {
    /// SHA-256 (hex) of the code; the plaintext is never stored.
    pub code_hash: String,
    pub expires_at: Timestamp,
}

/// Verification bookkeeping for a signup.
///
/// Present while a phone verification is outstanding or while failed attempts
/// are being counted. Cleared entirely on successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationState {
    pub pending: Option<PendingCode>,
    /// Failed attempts since the last issued code. Shared by phone and
    /// activation-code verification.
    pub attempts: u32,
    /// Start of the current daily send window.
    pub init_timestamp: Option<Timestamp>,
    pub last_sent: Option<Timestamp>,
    /// Codes sent since `init_timestamp`.
    pub sent_in_window: u32,
}

// ============================================================================
// Activation Reference
// ============================================================================

/// Activation event accepted for this signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialEventRef {
    pub event: EventCode,
    pub tiers: TierHints,
}

// ============================================================================
// Signup Record
// ============================================================================

/// The durable representation of one identity's onboarding progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRecord {
    pub key: SignupKey,
    pub claims: IdentityClaims,
    pub email_hash: EmailHash,
    pub phone_hash: Option<PhoneHash>,
    conditions: Vec<Condition>,
    pub verification: Option<VerificationState>,
    pub social_event: Option<SocialEventRef>,
    /// Assigned by downstream provisioning.
    pub compliant_username: Option<String>,
    /// Placement hint, set at approval time.
    pub target_cluster: Option<String>,
    pub created_at: Timestamp,
}

impl SignupRecord {
    /// Creates a record with an empty condition log.
    ///
    /// Internal to the kernel - external code should use [`crate::apply`]
    /// with [`crate::Command::Intake`].
    pub(crate) fn new(key: SignupKey, claims: IdentityClaims, now: Timestamp) -> Self {
        let email_hash = EmailHash::of(&claims.email);
        Self {
            key,
            claims,
            email_hash,
            phone_hash: None,
            conditions: Vec::new(),
            verification: None,
            social_event: None,
            compliant_username: None,
            target_cluster: None,
            created_at: now,
        }
    }

    /// Returns the condition log, oldest first.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the most recent condition, if any.
    pub fn last_condition(&self) -> Option<&Condition> {
        self.conditions.last()
    }

    /// Lifecycle state projected from the condition log.
    pub fn lifecycle(&self) -> LifecycleState {
        self.conditions
            .iter()
            .rev()
            .find_map(|c| c.kind.lifecycle())
            .unwrap_or(LifecycleState::VerificationRequired)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle().is_active()
    }

    /// True once downstream provisioning has confirmed the current approval.
    ///
    /// A `Provisioned` marker only counts if no later marker moved the record
    /// out of `Approved`.
    pub fn is_provisioned(&self) -> bool {
        let mut provisioned = false;
        for condition in &self.conditions {
            match condition.kind {
                ConditionKind::Provisioned => provisioned = true,
                ConditionKind::Reactivated => provisioned = false,
                kind => {
                    if kind.lifecycle().is_some_and(|s| s != LifecycleState::Approved) {
                        provisioned = false;
                    }
                }
            }
        }
        provisioned && self.lifecycle() == LifecycleState::Approved
    }

    /// The externally reported ready flag.
    pub fn is_ready(&self) -> bool {
        self.is_provisioned()
    }

    /// Failed verification attempts currently on record.
    pub fn attempts(&self) -> u32 {
        self.verification.as_ref().map_or(0, |v| v.attempts)
    }

    pub(crate) fn with_condition(mut self, kind: ConditionKind, at: Timestamp) -> Self {
        self.conditions.push(Condition::new(kind, at));
        self
    }

    pub(crate) fn with_claims(mut self, claims: IdentityClaims) -> Self {
        self.email_hash = EmailHash::of(&claims.email);
        self.claims = claims;
        self
    }

    /// Resets everything a reactivated signup must earn again.
    pub(crate) fn with_progress_cleared(mut self) -> Self {
        self.verification = None;
        self.phone_hash = None;
        self.social_event = None;
        self.target_cluster = None;
        self.compliant_username = None;
        self
    }

    pub(crate) fn with_verification(mut self, verification: Option<VerificationState>) -> Self {
        self.verification = verification;
        self
    }

    /// Increments the failed-attempt counter, saturating at `max`.
    pub(crate) fn with_failed_attempt(mut self, max: u32) -> Self {
        let verification = self.verification.get_or_insert_with(VerificationState::default);
        verification.attempts = verification.attempts.saturating_add(1).min(max);
        self
    }
}
