//! # Tollgate
//!
//! Gated onboarding for multi-tenant platforms.
//!
//! A new identity is admitted through a fixed sequence: token-authenticated
//! signup intake, optional phone or activation-code verification, manual or
//! automatic approval, and handoff to asynchronous provisioning. Uniqueness
//! and anti-abuse rules hold under concurrent requests using only
//! optimistic-concurrency updates to a versioned record store:
//!
//! - **One active signup per identity** - records are keyed by the normalized
//!   username and created with create-if-absent
//! - **One active signup per phone number** - phone claims are records too
//! - **Bounded verification** - attempts, expiry and a daily send limit
//! - **Windowed, capacity-limited activation codes** - seats are taken by
//!   conditional increment
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SignupService                          │
//! │  ┌────────────┐   ┌──────────────┐   ┌───────────────────┐  │
//! │  │   Dedup    │ → │    Kernel    │ → │  VersionedStore   │  │
//! │  │  (index)   │   │ (pure FSM)   │   │ (conditional put) │  │
//! │  └────────────┘   └──────────────┘   └───────────────────┘  │
//! │        Verification codes · Activation events · Effects      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use tollgate::{SignupService, TollgateConfig};
//!
//! let service = SignupService::in_memory(TollgateConfig::default());
//! let key = service.intake(claims)?;
//! service.request_code(&key, "+61", "408999999")?;
//! service.check_code(&key, "123456")?;
//! let status = service.get_status(&key)?;
//! ```

mod activation;
mod clock;
mod dedup;
mod directory;
mod error;
mod notifier;
mod service;
mod verification;

#[cfg(test)]
mod tests;

pub use activation::{NewEvent, generate_event_code};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DeduplicationIndex, PhoneClaim, encode_username, is_reserved, signup_key};
pub use directory::{ClusterDirectory, DirectoryError};
pub use error::{ErrorKind, Result, SignupError};
pub use notifier::{Delivery, LogNotifier, Notifier, NotifyError, RecordingNotifier};
pub use service::{SignupService, SignupStatus, StatusDetail, Stores};
pub use verification::generate_code;

// Re-export the building blocks callers need to drive the service
pub use tollgate_config::{MemberCluster, TollgateConfig};
pub use tollgate_kernel::{ActivationEvent, ActivationRejection, SignupRecord};
pub use tollgate_types::{
    EventCode, IdentityClaims, LifecycleState, PhoneHash, SignupKey, TierHints, Timestamp,
};
