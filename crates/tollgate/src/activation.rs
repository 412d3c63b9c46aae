//! Activation-code redemption and event administration.
//!
//! An event's `activation_count` is the hottest record in the system: every
//! redemption of a popular code increments it. Seats are taken with a
//! conditional increment; on a conflict the loop re-reads, re-checks capacity
//! and tries again.

use rand::Rng;
use serde::Deserialize;
use tollgate_kernel::{ActivationEvent, ActivationRejection, Command, check_redeemable};
use tollgate_store::{Step, StoreError, read_modify_write};
use tollgate_types::{EventCode, SignupKey, TierHints, Timestamp};
use tracing::instrument;

use crate::error::{Result, SignupError};
use crate::service::SignupService;

/// Administrative request to open a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Generated when absent.
    #[serde(default)]
    pub code: Option<EventCode>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Falls back to the configured default capacity.
    #[serde(default)]
    pub max_attendees: Option<u32>,
    #[serde(default)]
    pub user_tier: String,
    #[serde(default)]
    pub space_tier: String,
}

/// Generates a lowercase alphabetic event code.
pub fn generate_event_code(length: u32) -> EventCode {
    let mut rng = rand::thread_rng();
    let code: String = (0..length)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect();
    EventCode::new(code)
}

/// Why taking a seat failed.
enum SeatError {
    Rejected(ActivationRejection),
    Store(StoreError),
}

impl From<StoreError> for SeatError {
    fn from(err: StoreError) -> Self {
        SeatError::Store(err)
    }
}

impl SignupService {
    /// Redeems an activation code for a signup awaiting verification.
    ///
    /// Every rejection of the code itself is counted against the signup's
    /// verification attempts. On success the signup moves on to approval
    /// with the event's tier hints attached.
    #[instrument(skip_all, fields(key = %key, event = code))]
    pub fn redeem(&self, key: &SignupKey, code: &str) -> Result<()> {
        let record = self.active_record(key)?;
        check_redeemable(&record, &self.policy).map_err(|err| SignupError::from_kernel(err, key))?;

        let code = EventCode::new(code.trim());
        let tiers = match self.take_seat(&code) {
            Ok(tiers) => tiers,
            Err(SeatError::Rejected(reason)) => {
                tracing::info!(%reason, "activation code rejected");
                return self.commit(key, Command::RecordFailedAttempt { reason });
            }
            Err(SeatError::Store(err)) => return Err(err.into()),
        };

        let attached = self.commit(
            key,
            Command::AttachEvent {
                event: code.clone(),
                tiers,
            },
        );

        if let Err(err) = &attached {
            tracing::warn!(%err, "signup update failed after taking a seat, releasing it");
            self.release_seat(&code)?;
        } else {
            tracing::info!("activation code accepted");
        }
        attached
    }

    /// Conditionally increments the event's count.
    fn take_seat(&self, code: &EventCode) -> std::result::Result<TierHints, SeatError> {
        let result = read_modify_write(
            self.stores.events.as_ref(),
            code,
            self.config.activation.max_redeem_attempts,
            |current| {
                let Some(current) = current else {
                    return Err(SeatError::Rejected(ActivationRejection::UnknownCode));
                };
                let event = current
                    .value
                    .clone()
                    .with_redemption(self.now())
                    .map_err(SeatError::Rejected)?;
                let tiers = event.tiers();
                Ok(Step::Write {
                    value: event,
                    output: tiers,
                })
            },
        );

        match result {
            // Only a closed or full event is the caller's problem; losing the
            // race to unrelated writes is contention.
            Err(SeatError::Store(exhausted @ StoreError::RetriesExhausted { .. })) => {
                match self.stores.events.get(code)? {
                    Some(current) => {
                        current.value.check_open(self.now()).map_err(SeatError::Rejected)?;
                        Err(SeatError::Store(exhausted))
                    }
                    None => Err(SeatError::Rejected(ActivationRejection::UnknownCode)),
                }
            }
            other => other,
        }
    }

    fn release_seat(&self, code: &EventCode) -> Result<()> {
        read_modify_write(
            self.stores.events.as_ref(),
            code,
            self.config.activation.max_redeem_attempts,
            |current| {
                Ok::<_, SignupError>(match current {
                    Some(current) => Step::Write {
                        value: current.value.clone().with_released_seat(),
                        output: (),
                    },
                    None => Step::Skip(()),
                })
            },
        )
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Opens a campaign. Fails Conflict if the code is taken.
    #[instrument(skip_all)]
    pub fn create_event(&self, new: NewEvent) -> Result<ActivationEvent> {
        if new.end_time < new.start_time {
            return Err(SignupError::bad_request(
                "event end time precedes its start time",
                "invalid event",
            ));
        }
        let max_attendees = new
            .max_attendees
            .unwrap_or(self.config.activation.default_capacity);
        if max_attendees == 0 {
            return Err(SignupError::bad_request(
                "event capacity must be positive",
                "invalid event",
            ));
        }

        let code = match new.code {
            Some(code) if !code.as_str().trim().is_empty() => EventCode::new(code.as_str().trim()),
            _ => generate_event_code(self.config.activation.code_length),
        };
        let event = ActivationEvent::new(
            code.clone(),
            new.start_time,
            new.end_time,
            max_attendees,
            TierHints {
                user_tier: new.user_tier,
                space_tier: new.space_tier,
            },
        );

        match self.stores.events.create(code.clone(), event.clone()) {
            Ok(_) => {
                tracing::info!(%code, max_attendees, "activation event created");
                Ok(event)
            }
            Err(StoreError::AlreadyExists { .. }) => Err(SignupError::conflict(
                format!("activation event {code} already exists"),
                "error creating activation event",
            )),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_event(&self, code: &str) -> Result<ActivationEvent> {
        self.stores
            .events
            .get(&EventCode::new(code))?
            .map(|event| event.value)
            .ok_or_else(|| {
                SignupError::not_found(
                    format!("activation event {code} not found"),
                    "activation event not found",
                )
            })
    }
}
