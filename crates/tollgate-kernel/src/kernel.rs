//! The kernel - pure functional core of `Tollgate`.
//!
//! The kernel applies a command to the current version of a signup record and
//! produces the next version plus effects. It is completely pure: no IO, no
//! clocks, no randomness. The caller supplies "now" through [`Context`].
//!
//! # Example
//!
//! ```ignore
//! let ctx = Context::new(now, &policy);
//! let transition = apply(Some(record), Command::CheckCode { code }, &ctx)?;
//! // Service performs the conditional write, then executes effects...
//! ```

use chrono::Duration;
use tollgate_types::{ConditionKind, LifecycleState, Timestamp};

use crate::activation::ActivationRejection;
use crate::command::Command;
use crate::effects::{AuditAction, Effect};
use crate::state::{PendingCode, SignupRecord, SocialEventRef};

/// Length of the rolling window the daily send limit applies to.
const SEND_WINDOW_HOURS: i64 = 24;

// ============================================================================
// Context
// ============================================================================

/// Rules that vary by deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Failed verification attempts allowed before a new code is required.
    pub max_attempts: u32,
    /// Codes that may be sent within one rolling 24h window.
    pub daily_limit: u32,
    /// Approve signups as soon as they reach `PendingApproval`.
    pub auto_approve: bool,
    /// Placement used when an approval names no cluster.
    pub default_cluster: Option<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            daily_limit: 5,
            auto_approve: false,
            default_cluster: None,
        }
    }
}

/// Everything besides the record and command that a transition depends on.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub now: Timestamp,
    pub policy: &'a Policy,
}

impl<'a> Context<'a> {
    pub fn new(now: Timestamp, policy: &'a Policy) -> Self {
        Self { now, policy }
    }
}

// ============================================================================
// Transition
// ============================================================================

/// Outcome of applying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The record changed; write it, then execute the effects.
    Applied {
        record: SignupRecord,
        effects: Vec<Effect>,
    },
    /// The command failed but the failure itself must be recorded (a counted
    /// attempt). Write the record, execute the effects, then surface `error`.
    Rejected {
        record: SignupRecord,
        effects: Vec<Effect>,
        error: KernelError,
    },
    /// Nothing to write.
    Unchanged,
}

// ============================================================================
// Apply
// ============================================================================

/// Applies a command to the current record, producing the next transition.
///
/// `current` is `None` when no record exists for the key. Only
/// [`Command::Intake`] accepts a missing record.
#[allow(clippy::too_many_lines)]
pub fn apply(
    current: Option<SignupRecord>,
    cmd: Command,
    ctx: &Context<'_>,
) -> Result<Transition, KernelError> {
    let mut effects = Vec::new();

    let (record, cmd) = match (current, cmd) {
        // ====================================================================
        // Intake
        // ====================================================================
        (
            None,
            Command::Intake {
                key,
                claims,
                verification_required,
            },
        ) => {
            let record = SignupRecord::new(key.clone(), claims, ctx.now);
            effects.push(Effect::AuditLogAppend(AuditAction::SignupCreated {
                key,
                verification_required,
            }));
            let record = enter_initial_state(record, verification_required, ctx, &mut effects);

            // Postcondition: a fresh record starts active
            debug_assert!(record.is_active());
            return Ok(Transition::Applied { record, effects });
        }

        (
            Some(existing),
            Command::Intake {
                key,
                claims,
                verification_required,
            },
        ) => {
            // Precondition: intake always targets the record's own key
            assert_eq!(existing.key, key, "intake applied to a foreign record");

            if existing.is_active() {
                return Err(KernelError::AlreadyActive {
                    id: claims.sub.clone(),
                    username: claims.username().to_string(),
                });
            }

            let record = existing
                .with_claims(claims)
                .with_progress_cleared()
                .with_condition(ConditionKind::Reactivated, ctx.now);
            effects.push(Effect::AuditLogAppend(AuditAction::SignupReactivated {
                key,
            }));
            let record = enter_initial_state(record, verification_required, ctx, &mut effects);

            // Postcondition: reactivation restarts verification from scratch
            debug_assert!(record.verification.is_none());
            debug_assert!(record.phone_hash.is_none());
            return Ok(Transition::Applied { record, effects });
        }

        (None, _) => return Err(KernelError::NotFound),
        (Some(record), cmd) => (record, cmd),
    };

    match cmd {
        Command::Intake { .. } => unreachable!("intake handled above"),

        // ====================================================================
        // Phone Verification
        // ====================================================================
        Command::IssueCode {
            phone,
            code,
            expires_at,
        } => {
            require_awaiting_verification(&record)?;

            let mut verification = record.verification.clone().unwrap_or_default();
            let window_open = verification.init_timestamp.is_some_and(|start| {
                ctx.now - start < Duration::hours(SEND_WINDOW_HOURS)
            });
            if !window_open {
                verification.init_timestamp = Some(ctx.now);
                verification.sent_in_window = 0;
            }

            // Precondition: daily send budget not spent
            if verification.sent_in_window >= ctx.policy.daily_limit {
                return Err(KernelError::DailyLimitExceeded {
                    limit: ctx.policy.daily_limit,
                });
            }

            verification.pending = Some(PendingCode {
                code_hash: code.hash(),
                expires_at,
            });
            verification.attempts = 0;
            verification.last_sent = Some(ctx.now);
            verification.sent_in_window += 1;

            let mut record = record.with_verification(Some(verification));
            record.phone_hash = Some(phone.hash());

            effects.push(Effect::DeliverVerificationCode {
                key: record.key.clone(),
                phone,
                code,
            });
            effects.push(Effect::AuditLogAppend(AuditAction::VerificationCodeIssued {
                key: record.key.clone(),
            }));

            // Postcondition: fresh code resets the attempt budget
            debug_assert_eq!(record.attempts(), 0);
            Ok(Transition::Applied { record, effects })
        }

        Command::CheckCode { code } => {
            require_active(&record)?;
            if record.lifecycle() != LifecycleState::VerificationRequired {
                return Err(KernelError::NoOutstandingVerification);
            }
            if record.attempts() >= ctx.policy.max_attempts {
                return Err(KernelError::TooManyAttempts {
                    max: ctx.policy.max_attempts,
                });
            }

            let failure = match record.verification.as_ref().and_then(|v| v.pending.as_ref()) {
                None => Some(KernelError::NoOutstandingVerification),
                Some(pending) if ctx.now > pending.expires_at => Some(KernelError::CodeExpired),
                Some(pending) if !code.matches_hash(&pending.code_hash) => {
                    Some(KernelError::CodeMismatch)
                }
                Some(_) => None,
            };

            if let Some(error) = failure {
                let before = record.attempts();
                let pending_before = record.verification.as_ref().and_then(|v| v.pending.clone());
                let record = record.with_failed_attempt(ctx.policy.max_attempts);

                // Postcondition: attempts advance but never pass the maximum
                debug_assert_eq!(
                    record.attempts(),
                    (before + 1).min(ctx.policy.max_attempts)
                );
                // Postcondition: a failed check never touches the stored code
                debug_assert_eq!(
                    record.verification.as_ref().and_then(|v| v.pending.clone()),
                    pending_before
                );

                effects.push(Effect::AuditLogAppend(AuditAction::VerificationFailed {
                    key: record.key.clone(),
                    attempts: record.attempts(),
                }));
                return Ok(Transition::Rejected {
                    record,
                    effects,
                    error,
                });
            }

            let record = complete_verification(record, ctx, &mut effects);
            Ok(Transition::Applied { record, effects })
        }

        // ====================================================================
        // Activation Codes
        // ====================================================================
        Command::RecordFailedAttempt { reason } => {
            check_redeemable(&record, ctx.policy)?;

            let record = record.with_failed_attempt(ctx.policy.max_attempts);
            effects.push(Effect::AuditLogAppend(AuditAction::ActivationCodeRejected {
                key: record.key.clone(),
                reason,
                attempts: record.attempts(),
            }));

            // Postcondition: the event reference is untouched by a failure
            debug_assert!(record.social_event.is_none());
            Ok(Transition::Rejected {
                record,
                effects,
                error: KernelError::ActivationRejected(reason),
            })
        }

        Command::AttachEvent { event, tiers } => {
            check_redeemable(&record, ctx.policy)?;

            let mut record = record;
            record.social_event = Some(SocialEventRef {
                event: event.clone(),
                tiers,
            });
            effects.push(Effect::AuditLogAppend(AuditAction::ActivationCodeRedeemed {
                key: record.key.clone(),
                event,
            }));
            let record = complete_verification(record, ctx, &mut effects);
            Ok(Transition::Applied { record, effects })
        }

        // ====================================================================
        // Administration
        // ====================================================================
        Command::Approve {
            manual,
            target_cluster,
        } => match record.lifecycle() {
            LifecycleState::Approved => Ok(Transition::Unchanged),
            LifecycleState::PendingApproval => {
                let record = approve(record, manual, target_cluster, ctx, &mut effects);

                // Postcondition: approved records always carry a placement when a default exists
                debug_assert!(
                    record.target_cluster.is_some() || ctx.policy.default_cluster.is_none()
                );
                Ok(Transition::Applied { record, effects })
            }
            from => Err(KernelError::InvalidTransition {
                from,
                action: "approve",
            }),
        },

        Command::Deactivate { manual } => {
            if !record.is_active() {
                return Ok(Transition::Unchanged);
            }

            let kind = if manual {
                ConditionKind::ManuallyDeactivated
            } else {
                ConditionKind::Deactivated
            };
            let mut record = record
                .with_verification(None)
                .with_condition(kind, ctx.now);
            record.phone_hash = None;

            effects.push(Effect::AuditLogAppend(AuditAction::SignupDeactivated {
                key: record.key.clone(),
                manual,
            }));

            // Postcondition: the phone claim is released
            debug_assert!(record.phone_hash.is_none());
            debug_assert_eq!(record.lifecycle(), LifecycleState::Deactivated);
            Ok(Transition::Applied { record, effects })
        }

        Command::MarkProvisioned { compliant_username } => {
            let from = record.lifecycle();
            if from != LifecycleState::Approved {
                return Err(KernelError::InvalidTransition {
                    from,
                    action: "mark provisioned",
                });
            }
            if record.is_provisioned()
                && record.compliant_username.as_deref() == Some(compliant_username.as_str())
            {
                return Ok(Transition::Unchanged);
            }

            let mut record = record.with_condition(ConditionKind::Provisioned, ctx.now);
            record.compliant_username = Some(compliant_username.clone());
            effects.push(Effect::AuditLogAppend(AuditAction::SignupProvisioned {
                key: record.key.clone(),
                compliant_username,
            }));

            // Postcondition: provisioned approved record reports ready
            debug_assert!(record.is_ready());
            Ok(Transition::Applied { record, effects })
        }
    }
}

/// Checks whether a record may redeem an activation code.
///
/// Failing this check is not a counted attempt: nothing is written.
pub fn check_redeemable(record: &SignupRecord, policy: &Policy) -> Result<(), KernelError> {
    require_awaiting_verification(record)?;
    if record.social_event.is_some() {
        return Err(KernelError::EventAlreadyAttached);
    }
    if record.attempts() >= policy.max_attempts {
        return Err(KernelError::TooManyAttempts {
            max: policy.max_attempts,
        });
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn require_active(record: &SignupRecord) -> Result<(), KernelError> {
    if record.is_active() {
        Ok(())
    } else {
        Err(KernelError::NotFound)
    }
}

fn require_awaiting_verification(record: &SignupRecord) -> Result<(), KernelError> {
    require_active(record)?;
    if record.lifecycle() == LifecycleState::VerificationRequired {
        Ok(())
    } else {
        Err(KernelError::NotAwaitingVerification)
    }
}

fn enter_initial_state(
    record: SignupRecord,
    verification_required: bool,
    ctx: &Context<'_>,
    effects: &mut Vec<Effect>,
) -> SignupRecord {
    if verification_required {
        record.with_condition(ConditionKind::VerificationRequired, ctx.now)
    } else {
        enter_pending_approval(record, ctx, effects)
    }
}

fn complete_verification(
    record: SignupRecord,
    ctx: &Context<'_>,
    effects: &mut Vec<Effect>,
) -> SignupRecord {
    // Precondition: only a record awaiting verification can complete it
    debug_assert_eq!(record.lifecycle(), LifecycleState::VerificationRequired);

    let record = record
        .with_verification(None)
        .with_condition(ConditionKind::VerificationCompleted, ctx.now);
    effects.push(Effect::AuditLogAppend(AuditAction::VerificationCompleted {
        key: record.key.clone(),
    }));
    let record = enter_pending_approval(record, ctx, effects);

    // Postcondition: the verification sub-record is gone entirely
    debug_assert!(record.verification.is_none());
    record
}

fn enter_pending_approval(
    record: SignupRecord,
    ctx: &Context<'_>,
    effects: &mut Vec<Effect>,
) -> SignupRecord {
    let record = record.with_condition(ConditionKind::PendingApproval, ctx.now);
    if ctx.policy.auto_approve {
        approve(record, false, None, ctx, effects)
    } else {
        record
    }
}

fn approve(
    record: SignupRecord,
    manual: bool,
    target_cluster: Option<String>,
    ctx: &Context<'_>,
    effects: &mut Vec<Effect>,
) -> SignupRecord {
    let kind = if manual {
        ConditionKind::ApprovedByAdmin
    } else {
        ConditionKind::ApprovedAutomatically
    };
    let mut record = record.with_condition(kind, ctx.now);
    record.target_cluster = target_cluster.or_else(|| ctx.policy.default_cluster.clone());

    effects.push(Effect::AuditLogAppend(AuditAction::SignupApproved {
        key: record.key.clone(),
        manual,
        target_cluster: record.target_cluster.clone(),
    }));
    record
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur when applying commands to the kernel.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    // Identity errors
    #[error(
        "signup [id: {id}; username: {username}]. Unable to create signup because there is already an active signup with such ID"
    )]
    AlreadyActive { id: String, username: String },

    #[error("signup not found")]
    NotFound,

    // Verification errors
    #[error("no outstanding verification")]
    NoOutstandingVerification,

    #[error("invalid code: the provided code does not match")]
    CodeMismatch,

    #[error("invalid code: the provided code has expired")]
    CodeExpired,

    #[error("too many verification attempts")]
    TooManyAttempts { max: u32 },

    #[error("daily limit exceeded")]
    DailyLimitExceeded { limit: u32 },

    #[error("signup is not awaiting verification")]
    NotAwaitingVerification,

    // Activation errors
    #[error(transparent)]
    ActivationRejected(ActivationRejection),

    #[error("an activation code was already accepted for this signup")]
    EventAlreadyAttached,

    // Lifecycle errors
    #[error("cannot {action} a signup in state {from}")]
    InvalidTransition {
        from: LifecycleState,
        action: &'static str,
    },
}
