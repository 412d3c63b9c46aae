//! The signup service: the imperative shell around the kernel.
//!
//! Every mutating operation runs through [`SignupService::commit`]: read the
//! record and its version, compute the successor with the pure kernel, write
//! it conditionally, and only then execute the kernel's effects.

use std::sync::Arc;

use serde::Serialize;
use tollgate_config::TollgateConfig;
use tollgate_kernel::{
    ActivationEvent, Command, Context, Effect, Policy, SignupRecord, Transition, apply,
};
use tollgate_store::{InMemoryStore, Step, VersionedStore, read_modify_write};
use tollgate_types::{EventCode, IdentityClaims, LifecycleState, PhoneHash, SignupKey, Timestamp};
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::dedup::{self, DeduplicationIndex, PhoneClaim};
use crate::directory::ClusterDirectory;
use crate::error::{Result, SignupError};
use crate::notifier::{LogNotifier, Notifier};

/// Target for audit log entries.
const AUDIT_TARGET: &str = "tollgate::audit";

// ============================================================================
// Stores
// ============================================================================

/// The record stores the service reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub signups: Arc<dyn VersionedStore<SignupKey, SignupRecord>>,
    pub events: Arc<dyn VersionedStore<EventCode, ActivationEvent>>,
    pub phone_claims: Arc<dyn VersionedStore<PhoneHash, PhoneClaim>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            signups: Arc::new(InMemoryStore::new()),
            events: Arc::new(InMemoryStore::new()),
            phone_claims: Arc::new(InMemoryStore::new()),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// What a signed-up user is told about their signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupStatus {
    pub name: String,
    pub username: String,
    pub compliant_username: String,
    pub given_name: String,
    pub family_name: String,
    pub company: String,
    pub email: String,
    pub status: StatusDetail,
    #[serde(rename = "consoleURL", skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(rename = "proxyURL", skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetail {
    pub ready: bool,
    pub reason: String,
    pub verification_required: bool,
}

// ============================================================================
// Service
// ============================================================================

/// Drives signups through intake, verification, approval and provisioning.
///
/// Holds no mutable state of its own; everything shared lives in the stores.
/// Cheap to share behind an `Arc` across request handlers.
pub struct SignupService {
    pub(crate) stores: Stores,
    pub(crate) clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    pub(crate) config: TollgateConfig,
    pub(crate) policy: Policy,
    directory: ClusterDirectory,
}

impl SignupService {
    pub fn new(
        config: TollgateConfig,
        stores: Stores,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let directory = ClusterDirectory::new(config.clusters.clone());
        let policy = Policy {
            max_attempts: config.verification.max_attempts,
            daily_limit: config.verification.daily_limit,
            auto_approve: config.approval.automatic,
            default_cluster: directory.default_cluster().map(|c| c.name.clone()),
        };
        Self {
            stores,
            clock,
            notifier,
            config,
            policy,
            directory,
        }
    }

    /// A service over fresh in-memory stores, the system clock and a
    /// logging notifier.
    pub fn in_memory(config: TollgateConfig) -> Self {
        Self::new(
            config,
            Stores::in_memory(),
            Arc::new(SystemClock),
            Arc::new(LogNotifier),
        )
    }

    pub fn config(&self) -> &TollgateConfig {
        &self.config
    }

    pub fn directory(&self) -> &ClusterDirectory {
        &self.directory
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn dedup(&self) -> DeduplicationIndex<'_> {
        DeduplicationIndex::new(
            self.stores.signups.as_ref(),
            self.stores.phone_claims.as_ref(),
            self.config.store.max_conflict_retries,
        )
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Creates a signup for the claim set, or reactivates a deactivated one.
    ///
    /// Returns the key the signup is stored under.
    #[instrument(skip_all, fields(key))]
    pub fn intake(&self, claims: IdentityClaims) -> Result<SignupKey> {
        let key = dedup::signup_key(&claims);
        tracing::Span::current().record("key", key.as_str());

        if dedup::is_reserved(&key, &self.config.usernames) {
            tracing::info!("signup refused: reserved username");
            return Err(SignupError::reserved_username(claims.username()));
        }

        let verification_required = self
            .config
            .verification
            .required_for_domain(claims.email_domain().as_deref());

        self.commit(
            &key,
            Command::Intake {
                key: key.clone(),
                claims,
                verification_required,
            },
        )?;

        tracing::info!(verification_required, "signup accepted");
        Ok(key)
    }

    /// Reports where a signup stands. Deactivated signups are not found.
    #[instrument(skip_all, fields(key = %key))]
    pub fn get_status(&self, key: &SignupKey) -> Result<SignupStatus> {
        let record = self.active_record(key)?;
        let lifecycle = record.lifecycle();
        let provisioned = record.is_provisioned();

        let reason = match lifecycle {
            LifecycleState::Approved if provisioned => "Provisioned",
            LifecycleState::Approved => "Provisioning",
            _ => "PendingApproval",
        };

        let cluster = if provisioned {
            record
                .target_cluster
                .as_deref()
                .and_then(|name| self.directory.cluster(name).ok())
        } else {
            None
        };

        Ok(SignupStatus {
            name: record.key.to_string(),
            username: record.claims.username().to_string(),
            compliant_username: record.compliant_username.clone().unwrap_or_default(),
            given_name: record.claims.given_name.clone(),
            family_name: record.claims.family_name.clone(),
            company: record.claims.company.clone(),
            email: record.claims.email.clone(),
            status: StatusDetail {
                ready: record.is_ready(),
                reason: reason.to_string(),
                verification_required: lifecycle == LifecycleState::VerificationRequired,
            },
            console_url: cluster.map(|c| c.console_url.clone()),
            api_endpoint: cluster.map(|c| c.api_endpoint.clone()),
            proxy_url: cluster.and(self.config.server.proxy_url.clone()),
            cluster_name: cluster.map(|c| c.name.clone()),
        })
    }

    /// Approves a signup awaiting approval. Idempotent on approved signups.
    #[instrument(skip_all, fields(key = %key, manual))]
    pub fn approve(
        &self,
        key: &SignupKey,
        manual: bool,
        target_cluster: Option<String>,
    ) -> Result<()> {
        if let Some(name) = &target_cluster {
            self.directory
                .cluster(name)
                .map_err(|err| SignupError::bad_request(err.to_string(), "unknown cluster"))?;
        }
        self.commit(
            key,
            Command::Approve {
                manual,
                target_cluster,
            },
        )
    }

    /// Deactivates a signup and releases its phone number.
    #[instrument(skip_all, fields(key = %key, manual))]
    pub fn deactivate(&self, key: &SignupKey, manual: bool) -> Result<()> {
        let phone = self
            .stores
            .signups
            .get(key)?
            .and_then(|record| record.value.phone_hash);

        self.commit(key, Command::Deactivate { manual })?;

        if let Some(phone) = phone {
            self.dedup().release_phone(&phone, key, self.now())?;
        }
        Ok(())
    }

    /// Records that downstream provisioning finished for an approved signup.
    #[instrument(skip_all, fields(key = %key))]
    pub fn mark_provisioned(&self, key: &SignupKey, compliant_username: &str) -> Result<()> {
        if compliant_username.trim().is_empty() {
            return Err(SignupError::bad_request(
                "compliant username must not be empty",
                "invalid provisioning update",
            ));
        }
        self.commit(
            key,
            Command::MarkProvisioned {
                compliant_username: compliant_username.to_string(),
            },
        )
    }

    /// Reads the raw record, active or not.
    pub fn signup(&self, key: &SignupKey) -> Result<SignupRecord> {
        self.stores
            .signups
            .get(key)?
            .map(|record| record.value)
            .ok_or_else(|| SignupError::signup_not_found(key))
    }

    pub(crate) fn active_record(&self, key: &SignupKey) -> Result<SignupRecord> {
        self.dedup()
            .find_active(key)?
            .map(|record| record.value)
            .ok_or_else(|| SignupError::signup_not_found(key))
    }

    // ========================================================================
    // Commit Path
    // ========================================================================

    /// Applies `cmd` to the record under `key` with a bounded
    /// read-modify-conditional-write, then executes the effects.
    ///
    /// A kernel rejection that must be recorded (a counted attempt) is
    /// written first and returned as an error afterwards.
    pub(crate) fn commit(&self, key: &SignupKey, cmd: Command) -> Result<()> {
        let action = cmd.name();
        let (rejection, effects) = read_modify_write(
            self.stores.signups.as_ref(),
            key,
            self.config.store.max_conflict_retries,
            |current| {
                let ctx = Context::new(self.now(), &self.policy);
                let current = current.map(|c| c.value.clone());
                let transition = apply(current, cmd.clone(), &ctx)
                    .map_err(|err| SignupError::from_kernel(err, key))?;

                Ok::<_, SignupError>(match transition {
                    Transition::Applied { record, effects } => Step::Write {
                        value: record,
                        output: (None, effects),
                    },
                    Transition::Rejected {
                        record,
                        effects,
                        error,
                    } => Step::Write {
                        value: record,
                        output: (Some(error), effects),
                    },
                    Transition::Unchanged => Step::Skip((None, Vec::new())),
                })
            },
        )
        .inspect_err(|err: &SignupError| {
            tracing::debug!(%key, action, %err, "command refused");
        })?;

        self.execute_effects(effects)?;

        match rejection {
            Some(err) => {
                tracing::info!(%key, action, %err, "command rejected and recorded");
                Err(SignupError::from_kernel(err, key))
            }
            None => Ok(()),
        }
    }

    /// Executes effects produced by the kernel.
    ///
    /// This is the "imperative shell" that handles I/O.
    fn execute_effects(&self, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::DeliverVerificationCode { key, phone, code } => {
                    self.notifier
                        .deliver_code(&key, &phone, &code)
                        .map_err(|err| {
                            tracing::warn!(%key, %err, "verification code delivery failed");
                            SignupError::internal(format!(
                                "failed to deliver verification code: {err}"
                            ))
                        })?;
                }
                Effect::AuditLogAppend(action) => {
                    tracing::info!(target: AUDIT_TARGET, key = %action.key(), ?action, "audit");
                }
            }
        }
        Ok(())
    }
}
