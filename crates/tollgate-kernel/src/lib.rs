//! # tollgate-kernel: Functional core of `Tollgate`
//!
//! The kernel is the pure, deterministic heart of the signup lifecycle. It
//! receives a command together with the record it applies to and produces the
//! next record plus effects to execute.
//!
//! ## Key Principles
//!
//! - **No IO**: The kernel never touches the record store or the notifier
//! - **No clocks**: The current time arrives through [`Context`]
//! - **No randomness**: Verification codes are generated by the caller
//! - **Pure functions**: `apply(record, command, ctx) -> transition`
//!
//! ## Architecture
//!
//! - [`command`]: Commands that can be applied (`Intake`, `IssueCode`, ...)
//! - [`effects`]: Effects for the runtime to execute (`DeliverVerificationCode`, audit)
//! - [`state`]: The signup record and its verification sub-record
//! - [`activation`]: Activation event records and their redemption rules
//! - [`kernel`]: The `apply` function that ties it all together
//!
//! ## Example
//!
//! ```ignore
//! use tollgate_kernel::{Command, Context, Policy, Transition, apply};
//!
//! let policy = Policy::default();
//! let ctx = Context::new(now, &policy);
//!
//! match apply(current, Command::Deactivate { manual: true }, &ctx)? {
//!     Transition::Applied { record, effects } => { /* conditional write, then effects */ }
//!     Transition::Rejected { record, error, .. } => { /* persist, then surface error */ }
//!     Transition::Unchanged => { /* nothing to write */ }
//! }
//! ```

pub mod activation;
pub mod command;
pub mod effects;
pub mod kernel;
pub mod state;


pub use activation::{ActivationEvent, ActivationRejection};
pub use command::{Command, VerificationCode};
pub use effects::{AuditAction, Effect};
pub use kernel::{Context, KernelError, Policy, Transition, apply, check_redeemable};
pub use state::{PendingCode, SignupRecord, SocialEventRef, VerificationState};
