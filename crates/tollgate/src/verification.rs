//! Phone verification codes.

use chrono::Duration;
use rand::Rng;
use tollgate_kernel::{Command, KernelError, VerificationCode};
use tollgate_types::{LifecycleState, PhoneNumber, SignupKey};
use tracing::instrument;

use crate::error::{Result, SignupError};
use crate::service::SignupService;

/// Generates a numeric code of `length` digits.
pub fn generate_code(length: u32) -> VerificationCode {
    let mut rng = rand::thread_rng();
    let code: String = (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    VerificationCode::new(code)
}

impl SignupService {
    /// Sends a fresh verification code to a phone number.
    ///
    /// The number is claimed for this signup first; another active signup
    /// holding it makes the request fail Forbidden. A number this signup
    /// previously used is released once the new code is stored.
    #[instrument(skip_all, fields(key = %key))]
    pub fn request_code(
        &self,
        key: &SignupKey,
        country_code: &str,
        phone_number: &str,
    ) -> Result<()> {
        let phone = PhoneNumber::parse(country_code, phone_number).map_err(|err| {
            SignupError::forbidden(format!("invalid phone number: {err}"), "invalid phone number")
        })?;

        let record = self.active_record(key)?;
        if record.lifecycle() != LifecycleState::VerificationRequired {
            return Err(SignupError::from_kernel(
                KernelError::NotAwaitingVerification,
                key,
            ));
        }

        let hash = phone.hash();
        let previous = record.phone_hash;
        let index = self.dedup();
        index.claim_phone(&phone, key, self.now())?;

        let code = generate_code(self.config.verification.code_length);
        let expires_at =
            self.now() + Duration::seconds(self.config.verification.code_ttl_secs as i64);

        let result = self.commit(
            key,
            Command::IssueCode {
                phone,
                code,
                expires_at,
            },
        );

        // Whoever ended up not holding the number gives its claim back.
        let stored = self.stores.signups.get(key)?.and_then(|r| r.value.phone_hash);
        if stored.as_ref() != Some(&hash) {
            index.release_phone(&hash, key, self.now())?;
        }
        if let Some(previous) = previous.filter(|p| stored.as_ref() != Some(p)) {
            index.release_phone(&previous, key, self.now())?;
        }

        if result.is_ok() {
            tracing::info!("verification code issued");
        }
        result
    }

    /// Checks a code supplied by the user.
    ///
    /// Failed checks are counted against the signup even though the request
    /// fails.
    #[instrument(skip_all, fields(key = %key))]
    pub fn check_code(&self, key: &SignupKey, code: &str) -> Result<()> {
        self.commit(
            key,
            Command::CheckCode {
                code: VerificationCode::new(code),
            },
        )?;
        tracing::info!("phone verification completed");
        Ok(())
    }
}
