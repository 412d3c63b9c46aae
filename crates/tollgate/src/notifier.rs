//! Verification code delivery.

use std::sync::Mutex;

use tollgate_kernel::VerificationCode;
use tollgate_types::{PhoneNumber, SignupKey};

/// Sends verification codes to users.
///
/// Called only after the record holding the code's hash has been written.
pub trait Notifier: Send + Sync {
    fn deliver_code(
        &self,
        key: &SignupKey,
        phone: &PhoneNumber,
        code: &VerificationCode,
    ) -> Result<(), NotifyError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Logs that a code was dispatched, without the code itself.
///
/// Stands in for an SMS gateway in development deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver_code(
        &self,
        key: &SignupKey,
        phone: &PhoneNumber,
        _code: &VerificationCode,
    ) -> Result<(), NotifyError> {
        tracing::info!(%key, ?phone, "verification code dispatched");
        Ok(())
    }
}

/// A delivered code, as captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub key: SignupKey,
    pub phone: PhoneNumber,
    pub code: VerificationCode,
}

/// Keeps every delivery in memory so tests can read the codes back.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// The most recent code sent for `key`.
    pub fn last_code(&self, key: &SignupKey) -> Option<VerificationCode> {
        self.deliveries()
            .into_iter()
            .rev()
            .find(|d| &d.key == key)
            .map(|d| d.code)
    }

    /// Makes subsequent deliveries fail.
    pub fn fail_deliveries(&self, fail: bool) {
        if let Ok(mut guard) = self.fail.lock() {
            *guard = fail;
        }
    }
}

impl Notifier for RecordingNotifier {
    fn deliver_code(
        &self,
        key: &SignupKey,
        phone: &PhoneNumber,
        code: &VerificationCode,
    ) -> Result<(), NotifyError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(NotifyError::DeliveryFailed("gateway unavailable".to_string()));
        }
        let delivery = Delivery {
            key: key.clone(),
            phone: phone.clone(),
            code: code.clone(),
        };
        self.deliveries
            .lock()
            .map_err(|_| NotifyError::DeliveryFailed("recorder poisoned".to_string()))?
            .push(delivery);
        Ok(())
    }
}
