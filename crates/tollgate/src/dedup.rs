//! Deduplication index.
//!
//! Derives stable lookup keys from identity claims and phone numbers and
//! answers "who holds this?" questions. There is no separate index store:
//! signup records are keyed by their derived key, and phone numbers are
//! claimed through small [`PhoneClaim`] records in the same versioned store,
//! created with create-if-absent so that two concurrent requests for one
//! number cannot both win.

use serde::{Deserialize, Serialize};
use tollgate_config::UsernameConfig;
use tollgate_kernel::SignupRecord;
use tollgate_store::{Step, Versioned, VersionedStore, read_modify_write};
use tollgate_types::{IdentityClaims, PhoneHash, PhoneNumber, SignupKey, Timestamp, sha256_hex};

use crate::error::{Result, SignupError};

/// Longest key a signup can have.
pub const MAX_KEY_LEN: usize = 63;

/// Hex characters of the original's hash appended to altered keys.
const HASH_SUFFIX_LEN: usize = 8;

// ============================================================================
// Key Derivation
// ============================================================================

/// Derives the signup key for a claim set.
///
/// Uses the preferred username when one is supplied, else the subject.
pub fn signup_key(claims: &IdentityClaims) -> SignupKey {
    SignupKey::new(encode_username(claims.username()))
}

/// Encodes a username into a key safe for use as a record name.
///
/// Lowercases, maps characters outside `[a-z0-9-]` to `-` and trims leading
/// and trailing dashes. If that changed anything, or the result is too long,
/// the result is truncated and suffixed with part of the SHA-256 of the
/// original so that distinct inputs keep distinct keys. An empty result
/// becomes `crt-` plus the suffix.
///
/// # Examples
///
/// ```
/// # use tollgate::encode_username;
/// assert_eq!(encode_username("arnold"), "arnold");
/// assert!(encode_username("Arnold@Acme").starts_with("arnold-acme-"));
/// ```
pub fn encode_username(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' { c } else { '-' })
        .collect();
    let trimmed = mapped.trim_matches('-');

    if !trimmed.is_empty() && trimmed == name && trimmed.len() <= MAX_KEY_LEN {
        return trimmed.to_string();
    }

    let suffix = &sha256_hex(name.as_bytes())[..HASH_SUFFIX_LEN];
    if trimmed.is_empty() {
        return format!("crt-{suffix}");
    }

    let keep = MAX_KEY_LEN - HASH_SUFFIX_LEN - 1;
    let head = trimmed[..trimmed.len().min(keep)].trim_end_matches('-');
    let encoded = format!("{head}-{suffix}");

    // Postcondition: encoded keys fit the record name limit
    debug_assert!(encoded.len() <= MAX_KEY_LEN);
    encoded
}

/// Returns true if the key collides with a reserved name.
pub fn is_reserved(key: &SignupKey, config: &UsernameConfig) -> bool {
    let key = key.as_str();
    config
        .forbidden_prefixes
        .iter()
        .any(|prefix| key.starts_with(prefix.as_str()))
        || config
            .forbidden_suffixes
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()))
}

// ============================================================================
// Phone Claims
// ============================================================================

/// Ownership of a phone number, keyed by its hash.
///
/// A claim is held while its owner is an active signup. A claim whose owner
/// is missing, deactivated or released may be taken over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneClaim {
    pub owner: Option<SignupKey>,
    pub updated_at: Timestamp,
}

/// Lookups over the signup and phone-claim stores.
pub struct DeduplicationIndex<'a> {
    signups: &'a dyn VersionedStore<SignupKey, SignupRecord>,
    phone_claims: &'a dyn VersionedStore<PhoneHash, PhoneClaim>,
    max_attempts: u32,
}

impl<'a> DeduplicationIndex<'a> {
    pub fn new(
        signups: &'a dyn VersionedStore<SignupKey, SignupRecord>,
        phone_claims: &'a dyn VersionedStore<PhoneHash, PhoneClaim>,
        max_attempts: u32,
    ) -> Self {
        Self {
            signups,
            phone_claims,
            max_attempts,
        }
    }

    /// The active record stored under `key`, if any.
    pub fn find_active(&self, key: &SignupKey) -> Result<Option<Versioned<SignupRecord>>> {
        Ok(self
            .signups
            .get(key)?
            .filter(|record| record.value.is_active()))
    }

    /// The active signup currently holding `phone`, if any.
    pub fn holder_of_phone(&self, phone: &PhoneHash) -> Result<Option<SignupKey>> {
        match self.phone_claims.get(phone)? {
            Some(claim) => self.live_owner(&claim.value),
            None => Ok(None),
        }
    }

    /// Claims `phone` for `key`.
    ///
    /// Succeeds if the number is unclaimed, already claimed by `key`, or held
    /// by a stale claim. Fails Forbidden if another active signup holds it.
    pub fn claim_phone(
        &self,
        phone: &PhoneNumber,
        key: &SignupKey,
        now: Timestamp,
    ) -> Result<()> {
        let hash = phone.hash();
        read_modify_write(self.phone_claims, &hash, self.max_attempts, |current| {
            if let Some(current) = current {
                match self.live_owner(&current.value)? {
                    Some(owner) if &owner == key => return Ok(Step::Skip(())),
                    Some(owner) => {
                        tracing::debug!(%key, %owner, "phone number held by another signup");
                        return Err(SignupError::phone_in_use(phone.as_str()));
                    }
                    None => {}
                }
            }
            Ok(Step::Write {
                value: PhoneClaim {
                    owner: Some(key.clone()),
                    updated_at: now,
                },
                output: (),
            })
        })
    }

    /// Releases `key`'s claim on `phone`. A claim held by anyone else is left
    /// alone.
    pub fn release_phone(&self, phone: &PhoneHash, key: &SignupKey, now: Timestamp) -> Result<()> {
        read_modify_write(self.phone_claims, phone, self.max_attempts, |current| {
            match current {
                Some(claim) if claim.value.owner.as_ref() == Some(key) => Ok(Step::Write {
                    value: PhoneClaim {
                        owner: None,
                        updated_at: now,
                    },
                    output: (),
                }),
                _ => Ok::<_, SignupError>(Step::Skip(())),
            }
        })
    }

    fn live_owner(&self, claim: &PhoneClaim) -> Result<Option<SignupKey>> {
        let Some(owner) = &claim.owner else {
            return Ok(None);
        };
        Ok(self.find_active(owner)?.map(|_| owner.clone()))
    }
}
