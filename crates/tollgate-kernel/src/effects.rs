//! Effects produced by the kernel.
//!
//! Effects represent side effects that the runtime must execute after the
//! conditional write of a record commits. The kernel is pure - it produces
//! effects but never executes them directly.

use serde::Serialize;
use tollgate_types::{EventCode, PhoneNumber, SignupKey};

use crate::activation::ActivationRejection;
use crate::command::VerificationCode;

/// An effect to be executed by the runtime.
///
/// A rejected conditional write discards its effects, so a code is only ever
/// delivered once the record holding its hash is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a verification code to the given phone number.
    DeliverVerificationCode {
        key: SignupKey,
        phone: PhoneNumber,
        code: VerificationCode,
    },

    /// Append an entry to the audit log.
    AuditLogAppend(AuditAction),
}

/// Audit trail entries.
///
/// These never carry phone numbers or codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    SignupCreated {
        key: SignupKey,
        verification_required: bool,
    },
    SignupReactivated {
        key: SignupKey,
    },
    VerificationCodeIssued {
        key: SignupKey,
    },
    VerificationFailed {
        key: SignupKey,
        attempts: u32,
    },
    VerificationCompleted {
        key: SignupKey,
    },
    ActivationCodeRedeemed {
        key: SignupKey,
        event: EventCode,
    },
    ActivationCodeRejected {
        key: SignupKey,
        reason: ActivationRejection,
        attempts: u32,
    },
    SignupApproved {
        key: SignupKey,
        manual: bool,
        target_cluster: Option<String>,
    },
    SignupDeactivated {
        key: SignupKey,
        manual: bool,
    },
    SignupProvisioned {
        key: SignupKey,
        compliant_username: String,
    },
}

impl AuditAction {
    /// The signup the entry refers to.
    pub fn key(&self) -> &SignupKey {
        match self {
            AuditAction::SignupCreated { key, .. }
            | AuditAction::SignupReactivated { key }
            | AuditAction::VerificationCodeIssued { key }
            | AuditAction::VerificationFailed { key, .. }
            | AuditAction::VerificationCompleted { key }
            | AuditAction::ActivationCodeRedeemed { key, .. }
            | AuditAction::ActivationCodeRejected { key, .. }
            | AuditAction::SignupApproved { key, .. }
            | AuditAction::SignupDeactivated { key, .. }
            | AuditAction::SignupProvisioned { key, .. } => key,
        }
    }
}
