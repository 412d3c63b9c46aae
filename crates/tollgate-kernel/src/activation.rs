//! Activation events: capacity- and time-windowed campaigns whose code lets a
//! signup skip phone verification.

use serde::{Deserialize, Serialize};
use tollgate_types::{EventCode, TierHints, Timestamp};

/// Why an activation code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ActivationRejection {
    #[error("invalid code")]
    UnknownCode,

    #[error("not open yet")]
    NotOpenYet,

    #[error("already closed")]
    AlreadyClosed,

    #[error("over capacity")]
    OverCapacity,
}

/// A campaign record, keyed by its activation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationEvent {
    pub code: EventCode,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub max_attendees: u32,
    pub activation_count: u32,
    pub user_tier: String,
    pub space_tier: String,
}

impl ActivationEvent {
    pub fn new(
        code: EventCode,
        start_time: Timestamp,
        end_time: Timestamp,
        max_attendees: u32,
        tiers: TierHints,
    ) -> Self {
        Self {
            code,
            start_time,
            end_time,
            max_attendees,
            activation_count: 0,
            user_tier: tiers.user_tier,
            space_tier: tiers.space_tier,
        }
    }

    /// Checks that `now` falls inside the window and a seat is free.
    ///
    /// Both window bounds are inclusive.
    pub fn check_open(&self, now: Timestamp) -> Result<(), ActivationRejection> {
        if now < self.start_time {
            return Err(ActivationRejection::NotOpenYet);
        }
        if now > self.end_time {
            return Err(ActivationRejection::AlreadyClosed);
        }
        if self.activation_count >= self.max_attendees {
            return Err(ActivationRejection::OverCapacity);
        }
        Ok(())
    }

    /// Takes one seat.
    pub fn with_redemption(mut self, now: Timestamp) -> Result<Self, ActivationRejection> {
        self.check_open(now)?;
        self.activation_count += 1;

        // Postcondition: capacity never exceeded
        debug_assert!(self.activation_count <= self.max_attendees);
        Ok(self)
    }

    /// Gives a seat back after the signup side of a redemption failed.
    pub fn with_released_seat(mut self) -> Self {
        self.activation_count = self.activation_count.saturating_sub(1);
        self
    }

    pub fn tiers(&self) -> TierHints {
        TierHints {
            user_tier: self.user_tier.clone(),
            space_tier: self.space_tier.clone(),
        }
    }
}
