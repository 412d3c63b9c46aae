//! End-to-end tests of the signup service over in-memory stores.

use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use test_case::test_case;
use tollgate_kernel::SignupRecord;
use tollgate_store::{InMemoryStore, StoreError, Version, Versioned, VersionedStore};

use crate::*;

// ============================================================================
// Harness
// ============================================================================

fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

struct Harness {
    service: SignupService,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(config: TollgateConfig) -> Harness {
    harness_with(config, Stores::in_memory())
}

fn harness_with(config: TollgateConfig, stores: Stores) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let notifier = Arc::new(RecordingNotifier::new());
    let service = SignupService::new(config, stores, clock.clone(), notifier.clone());
    Harness {
        service,
        clock,
        notifier,
    }
}

fn claims(username: &str, email: &str) -> IdentityClaims {
    IdentityClaims {
        sub: format!("{username}-sub"),
        user_id: format!("{username}-id"),
        email: email.to_string(),
        given_name: "Arnold".to_string(),
        family_name: "Schwarz".to_string(),
        company: "Acme".to_string(),
        preferred_username: Some(username.to_string()),
        ..Default::default()
    }
}

fn manual_approval() -> TollgateConfig {
    TollgateConfig::default()
}

fn no_verification() -> TollgateConfig {
    let mut config = TollgateConfig::default();
    config.verification.enabled = false;
    config
}

fn open_event(h: &Harness, code: &str, capacity: u32) -> ActivationEvent {
    h.service
        .create_event(NewEvent {
            code: Some(EventCode::new(code)),
            start_time: start() - Duration::hours(1),
            end_time: start() + Duration::hours(1),
            max_attendees: Some(capacity),
            user_tier: "deactivate80".to_string(),
            space_tier: "base1ns".to_string(),
        })
        .unwrap()
}

fn message(err: &SignupError) -> String {
    err.to_string()
}

// ============================================================================
// Intake
// ============================================================================

#[test]
fn intake_creates_signup_awaiting_verification() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    assert_eq!(key.as_str(), "arnold");
    let status = h.service.get_status(&key).unwrap();
    assert_eq!(status.username, "arnold");
    assert_eq!(status.compliant_username, "");
    assert_eq!(status.given_name, "Arnold");
    assert!(status.status.verification_required);
    assert!(!status.status.ready);
    assert_eq!(status.status.reason, "PendingApproval");
    assert!(status.console_url.is_none());
}

#[test]
fn second_intake_for_active_signup_conflicts() {
    let h = harness(manual_approval());
    h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    let err = h
        .service
        .intake(claims("arnold", "arnold@some.domain"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        message(&err),
        "signup [id: arnold-sub; username: arnold]. Unable to create signup because there is already an active signup with such ID"
    );
    assert_eq!(err.details(), "error creating signup");
}

#[test_case("test-crtadmin"; "forbidden suffix")]
#[test_case("openshift-ops"; "forbidden prefix")]
#[test_case("kube-system"; "kube prefix")]
fn reserved_usernames_are_refused(username: &str) {
    let h = harness(manual_approval());
    let err = h
        .service
        .intake(claims(username, "someone@some.domain"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(
        message(&err),
        format!("forbidden: failed to create signup for {username}")
    );
    assert!(h.service.signup(&SignupKey::new(username)).is_err());
}

#[test]
fn excluded_email_domain_skips_verification() {
    let mut config = manual_approval();
    config.verification.excluded_email_domains = vec!["acme.com".to_string()];
    let h = harness(config);

    let key = h.service.intake(claims("wile", "wile@acme.com")).unwrap();
    let status = h.service.get_status(&key).unwrap();
    assert!(!status.status.verification_required);
    assert_eq!(status.status.reason, "PendingApproval");

    let key = h.service.intake(claims("road", "road@runner.org")).unwrap();
    assert!(h.service.get_status(&key).unwrap().status.verification_required);
}

#[test]
fn automatic_approval_goes_straight_to_provisioning() {
    let h = harness(TollgateConfig::development());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    let status = h.service.get_status(&key).unwrap();
    assert!(!status.status.verification_required);
    assert_eq!(status.status.reason, "Provisioning");
    assert!(!status.status.ready);
}

#[test]
fn unusual_usernames_get_stable_distinct_keys() {
    let h = harness(no_verification());
    let a = h.service.intake(claims("Arnold@Acme", "a@some.domain")).unwrap();
    let b = h.service.intake(claims("arnold.acme", "b@some.domain")).unwrap();

    assert_ne!(a, b);
    assert_eq!(h.service.get_status(&a).unwrap().username, "Arnold@Acme");
}

// ============================================================================
// Phone Verification
// ============================================================================

#[test]
fn phone_verification_happy_path() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.service.request_code(&key, "+61", "408999999").unwrap();
    let delivery = h.notifier.deliveries().pop().unwrap();
    assert_eq!(delivery.phone.as_str(), "+61408999999");

    let err = h.service.check_code(&key, "not-it").unwrap_err();
    assert_eq!(message(&err), "invalid code: the provided code does not match");
    assert_eq!(err.details(), "error while verifying");
    assert_eq!(h.service.signup(&key).unwrap().attempts(), 1);

    h.service.check_code(&key, delivery.code.as_str()).unwrap();
    let status = h.service.get_status(&key).unwrap();
    assert!(!status.status.verification_required);
    assert_eq!(status.status.reason, "PendingApproval");

    let err = h
        .service
        .check_code(&key, delivery.code.as_str())
        .unwrap_err();
    assert_eq!(message(&err), "no outstanding verification");
}

#[test]
fn verified_signup_is_auto_approved_when_configured() {
    let mut config = manual_approval();
    config.approval.automatic = true;
    let h = harness(config);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.service.request_code(&key, "+1", "(555) 010-4477").unwrap();
    let code = h.notifier.last_code(&key).unwrap();
    h.service.check_code(&key, code.as_str()).unwrap();

    assert_eq!(h.service.get_status(&key).unwrap().status.reason, "Provisioning");
}

#[test]
fn attempts_are_bounded_even_for_the_right_code() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    h.service.request_code(&key, "+61", "408999999").unwrap();
    let code = h.notifier.last_code(&key).unwrap();

    for _ in 0..3 {
        assert!(h.service.check_code(&key, "000").is_err());
    }
    let err = h.service.check_code(&key, code.as_str()).unwrap_err();
    assert_eq!(message(&err), "too many verification attempts");
    assert_eq!(h.service.signup(&key).unwrap().attempts(), 3);

    // A fresh code resets the attempt counter
    h.service.request_code(&key, "+61", "408999999").unwrap();
    let code = h.notifier.last_code(&key).unwrap();
    h.service.check_code(&key, code.as_str()).unwrap();
}

#[test]
fn expired_codes_are_rejected() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    h.service.request_code(&key, "+61", "408999999").unwrap();
    let code = h.notifier.last_code(&key).unwrap();

    h.clock.advance(Duration::seconds(301));
    let err = h.service.check_code(&key, code.as_str()).unwrap_err();
    assert_eq!(message(&err), "invalid code: the provided code has expired");
}

#[test]
fn code_requests_are_limited_per_day() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    for _ in 0..5 {
        h.service.request_code(&key, "+61", "408999999").unwrap();
        h.clock.advance(Duration::minutes(10));
    }
    let err = h.service.request_code(&key, "+61", "408999999").unwrap_err();
    assert_eq!(message(&err), "daily limit exceeded");
    assert_eq!(h.notifier.deliveries().len(), 5);

    h.clock.advance(Duration::hours(24));
    h.service.request_code(&key, "+61", "408999999").unwrap();
}

#[test]
fn invalid_phone_numbers_are_forbidden() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    let err = h.service.request_code(&key, "+61", "40x999").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(message(&err).starts_with("invalid phone number"));
}

#[test]
fn code_requests_require_pending_verification() {
    let h = harness(no_verification());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    let err = h.service.request_code(&key, "+61", "408999999").unwrap_err();
    assert_eq!(message(&err), "signup is not awaiting verification");
    assert!(h.notifier.deliveries().is_empty());
}

#[test]
fn failed_delivery_is_internal() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.notifier.fail_deliveries(true);
    let err = h.service.request_code(&key, "+61", "408999999").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    h.notifier.fail_deliveries(false);
    h.service.request_code(&key, "+61", "408999999").unwrap();
}

// ============================================================================
// Phone Uniqueness
// ============================================================================

#[test]
fn phone_number_is_held_until_deactivation() {
    let h = harness(manual_approval());
    let first = h.service.intake(claims("arnold", "a@some.domain")).unwrap();
    let second = h.service.intake(claims("bruce", "b@some.domain")).unwrap();

    h.service.request_code(&first, "+61", "408999999").unwrap();
    let err = h
        .service
        .request_code(&second, "+61", "408 999 999")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(
        message(&err),
        "phone number already in use: cannot register using phone number: +61408999999"
    );

    h.service.deactivate(&first, true).unwrap();
    h.service.request_code(&second, "+61", "408999999").unwrap();
}

#[test]
fn switching_numbers_releases_the_old_one() {
    let h = harness(manual_approval());
    let first = h.service.intake(claims("arnold", "a@some.domain")).unwrap();
    let second = h.service.intake(claims("bruce", "b@some.domain")).unwrap();

    h.service.request_code(&first, "+61", "408999999").unwrap();
    h.service.request_code(&first, "+61", "408111111").unwrap();
    h.service.request_code(&second, "+61", "408999999").unwrap();
}

#[test]
fn concurrent_claims_on_one_number_admit_one_signup() {
    let h = harness(manual_approval());
    let keys: Vec<SignupKey> = (0..8)
        .map(|i| {
            h.service
                .intake(claims(&format!("user{i}"), &format!("u{i}@some.domain")))
                .unwrap()
        })
        .collect();

    let service = &h.service;
    let successes = thread::scope(|s| {
        let handles: Vec<_> = keys
            .iter()
            .map(|key| s.spawn(move || service.request_code(key, "+44", "7700900123").is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(successes, 1);
    assert_eq!(h.notifier.deliveries().len(), 1);
}

// ============================================================================
// Activation Codes
// ============================================================================

#[test]
fn redeeming_a_code_skips_phone_verification() {
    let h = harness(manual_approval());
    open_event(&h, "summit", 10);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.service.redeem(&key, "summit").unwrap();

    let status = h.service.get_status(&key).unwrap();
    assert!(!status.status.verification_required);
    assert_eq!(status.status.reason, "PendingApproval");

    let record = h.service.signup(&key).unwrap();
    let social = record.social_event.unwrap();
    assert_eq!(social.event.as_str(), "summit");
    assert_eq!(social.tiers.user_tier, "deactivate80");
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 1);
}

#[test_case(-Duration::hours(2), "not open yet"; "before the window")]
#[test_case(Duration::hours(2), "already closed"; "after the window")]
fn redemption_outside_the_window_is_rejected(offset: Duration, expected: &str) {
    let h = harness(manual_approval());
    open_event(&h, "summit", 10);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.clock.advance(offset);
    let err = h.service.redeem(&key, "summit").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(message(&err), expected);
    assert_eq!(h.service.signup(&key).unwrap().attempts(), 1);
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 0);
}

#[test]
fn window_bounds_are_inclusive() {
    let h = harness(manual_approval());
    open_event(&h, "summit", 10);
    let early = h.service.intake(claims("arnold", "a@some.domain")).unwrap();
    let late = h.service.intake(claims("bruce", "b@some.domain")).unwrap();

    h.clock.set(start() - Duration::hours(1));
    h.service.redeem(&early, "summit").unwrap();
    h.clock.set(start() + Duration::hours(1));
    h.service.redeem(&late, "summit").unwrap();
}

#[test]
fn unknown_codes_count_against_attempts() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    for attempt in 1..=3 {
        let err = h.service.redeem(&key, "nope").unwrap_err();
        assert_eq!(message(&err), "invalid code");
        assert_eq!(h.service.signup(&key).unwrap().attempts(), attempt);
    }

    open_event(&h, "nope", 10);
    let err = h.service.redeem(&key, "nope").unwrap_err();
    assert_eq!(message(&err), "too many verification attempts");
    assert_eq!(h.service.get_event("nope").unwrap().activation_count, 0);
}

#[test]
fn full_events_turn_signups_away() {
    let h = harness(manual_approval());
    open_event(&h, "tiny", 1);
    let first = h.service.intake(claims("arnold", "a@some.domain")).unwrap();
    let second = h.service.intake(claims("bruce", "b@some.domain")).unwrap();

    h.service.redeem(&first, "tiny").unwrap();
    let err = h.service.redeem(&second, "tiny").unwrap_err();
    assert_eq!(message(&err), "over capacity");
}

#[test]
fn a_signup_redeems_at_most_once() {
    let h = harness(manual_approval());
    open_event(&h, "summit", 10);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    h.service.redeem(&key, "summit").unwrap();
    assert!(h.service.redeem(&key, "summit").is_err());
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 1);
}

#[test_case(16, 5; "sixteen racers for five seats")]
#[test_case(2, 1; "two racers for the last seat")]
#[test_case(6, 10; "room for everyone")]
fn concurrent_redemptions_never_exceed_capacity(racers: usize, capacity: u32) {
    let h = harness(manual_approval());
    open_event(&h, "rush", capacity);
    let keys: Vec<SignupKey> = (0..racers)
        .map(|i| {
            h.service
                .intake(claims(&format!("user{i}"), &format!("u{i}@some.domain")))
                .unwrap()
        })
        .collect();

    let service = &h.service;
    let admitted = thread::scope(|s| {
        let handles: Vec<_> = keys
            .iter()
            .map(|key| s.spawn(move || service.redeem(key, "rush")))
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(message(err), "over capacity");
        }
        results.iter().filter(|r| r.is_ok()).count()
    });

    let expected = racers.min(capacity as usize);
    assert_eq!(admitted, expected);
    assert_eq!(
        h.service.get_event("rush").unwrap().activation_count as usize,
        expected
    );
}

// ============================================================================
// Event Administration
// ============================================================================

#[test]
fn events_get_generated_codes_and_default_capacity() {
    let h = harness(manual_approval());
    let event = h
        .service
        .create_event(NewEvent {
            code: None,
            start_time: start(),
            end_time: start() + Duration::days(1),
            max_attendees: None,
            user_tier: String::new(),
            space_tier: String::new(),
        })
        .unwrap();

    assert_eq!(event.code.as_str().len(), 5);
    assert_eq!(event.max_attendees, 100);
    assert_eq!(h.service.get_event(event.code.as_str()).unwrap(), event);
}

#[test]
fn duplicate_event_codes_conflict() {
    let h = harness(manual_approval());
    open_event(&h, "summit", 10);
    let err = h
        .service
        .create_event(NewEvent {
            code: Some(EventCode::new("summit")),
            start_time: start(),
            end_time: start(),
            max_attendees: Some(1),
            user_tier: String::new(),
            space_tier: String::new(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test_case(Duration::hours(-1), Some(10); "inverted window")]
#[test_case(Duration::hours(1), Some(0); "zero capacity")]
fn malformed_events_are_bad_requests(length: Duration, capacity: Option<u32>) {
    let h = harness(manual_approval());
    let err = h
        .service
        .create_event(NewEvent {
            code: None,
            start_time: start(),
            end_time: start() + length,
            max_attendees: capacity,
            user_tier: String::new(),
            space_tier: String::new(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn missing_events_are_not_found() {
    let h = harness(manual_approval());
    assert_eq!(
        h.service.get_event("ghost").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// ============================================================================
// Approval, Provisioning, Deactivation
// ============================================================================

#[test]
fn manual_approval_then_provisioning_reports_cluster() {
    let mut config = no_verification();
    config.server.proxy_url = Some("https://proxy.member-1.example.com".to_string());
    let h = harness(config);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    assert_eq!(h.service.get_status(&key).unwrap().status.reason, "PendingApproval");

    h.service.approve(&key, true, None).unwrap();
    let status = h.service.get_status(&key).unwrap();
    assert_eq!(status.status.reason, "Provisioning");
    assert!(status.console_url.is_none());

    h.service.mark_provisioned(&key, "arnold").unwrap();
    let status = h.service.get_status(&key).unwrap();
    assert!(status.status.ready);
    assert_eq!(status.status.reason, "Provisioned");
    assert_eq!(status.compliant_username, "arnold");
    assert_eq!(status.cluster_name.as_deref(), Some("member-1"));
    assert_eq!(
        status.console_url.as_deref(),
        Some("https://console.member-1.example.com/")
    );
    assert_eq!(
        status.proxy_url.as_deref(),
        Some("https://proxy.member-1.example.com")
    );
}

#[test]
fn approval_is_idempotent() {
    let h = harness(no_verification());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    h.service.approve(&key, true, None).unwrap();
    h.service.approve(&key, true, None).unwrap();
}

#[test]
fn approval_requires_completed_verification() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    let err = h.service.approve(&key, true, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn approval_to_unknown_cluster_is_a_bad_request() {
    let h = harness(no_verification());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    let err = h
        .service
        .approve(&key, true, Some("nowhere".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn deactivated_signups_are_not_found_until_signing_up_again() {
    let h = harness(manual_approval());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    h.service.request_code(&key, "+61", "408999999").unwrap();
    h.service.deactivate(&key, false).unwrap();

    assert_eq!(
        h.service.get_status(&key).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    // Deactivating twice is a no-op
    h.service.deactivate(&key, false).unwrap();

    let again = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    assert_eq!(again, key);
    let status = h.service.get_status(&key).unwrap();
    assert!(status.status.verification_required);
    assert_eq!(h.service.signup(&key).unwrap().attempts(), 0);

    h.service.request_code(&key, "+61", "408999999").unwrap();
}

#[test]
fn operations_on_unknown_signups_are_not_found() {
    let h = harness(manual_approval());
    let ghost = SignupKey::new("ghost");
    assert_eq!(h.service.get_status(&ghost).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        h.service.check_code(&ghost, "123456").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        h.service.request_code(&ghost, "+61", "408999999").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(h.service.redeem(&ghost, "summit").unwrap_err().kind(), ErrorKind::NotFound);
}

// ============================================================================
// Store Failures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Conflict,
    Unavailable,
}

/// Signup store whose conditional writes can be made to fail.
struct FaultyStore {
    inner: InMemoryStore<SignupKey, SignupRecord>,
    fault: Mutex<Fault>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fault: Mutex::new(Fault::None),
        }
    }

    fn set(&self, fault: Fault) {
        *self.fault.lock().unwrap() = fault;
    }
}

impl VersionedStore<SignupKey, SignupRecord> for FaultyStore {
    fn get(&self, key: &SignupKey) -> Result<Option<Versioned<SignupRecord>>, StoreError> {
        self.inner.get(key)
    }

    fn create(&self, key: SignupKey, value: SignupRecord) -> Result<Version, StoreError> {
        self.inner.create(key, value)
    }

    fn conditional_put(
        &self,
        key: &SignupKey,
        expected: Version,
        value: SignupRecord,
    ) -> Result<Version, StoreError> {
        match *self.fault.lock().unwrap() {
            Fault::None => self.inner.conditional_put(key, expected, value),
            Fault::Conflict => Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                actual: expected.next(),
            }),
            Fault::Unavailable => Err(StoreError::Unavailable("disk on fire".to_string())),
        }
    }

    fn list(&self) -> Result<Vec<(SignupKey, Versioned<SignupRecord>)>, StoreError> {
        self.inner.list()
    }
}

fn faulty_harness(config: TollgateConfig) -> (Harness, Arc<FaultyStore>) {
    let signups = Arc::new(FaultyStore::new());
    let stores = Stores {
        signups: signups.clone(),
        ..Stores::in_memory()
    };
    (harness_with(config, stores), signups)
}

#[test]
fn persistent_conflicts_surface_as_transient() {
    let (h, signups) = faulty_harness(no_verification());
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    signups.set(Fault::Conflict);
    let err = h.service.approve(&key, true, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientConflict);

    signups.set(Fault::None);
    h.service.approve(&key, true, None).unwrap();
}

#[test]
fn seat_is_given_back_when_the_signup_write_fails() {
    let (h, signups) = faulty_harness(manual_approval());
    open_event(&h, "summit", 1);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    signups.set(Fault::Unavailable);
    let err = h.service.redeem(&key, "summit").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 0);

    signups.set(Fault::None);
    h.service.redeem(&key, "summit").unwrap();
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 1);
}

/// Event store where another writer touches the record just before each of
/// our conditional writes.
struct ContendedEvents {
    inner: InMemoryStore<EventCode, ActivationEvent>,
    contended: Mutex<bool>,
}

impl ContendedEvents {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            contended: Mutex::new(false),
        }
    }

    fn set(&self, contended: bool) {
        *self.contended.lock().unwrap() = contended;
    }
}

impl VersionedStore<EventCode, ActivationEvent> for ContendedEvents {
    fn get(&self, key: &EventCode) -> Result<Option<Versioned<ActivationEvent>>, StoreError> {
        self.inner.get(key)
    }

    fn create(&self, key: EventCode, value: ActivationEvent) -> Result<Version, StoreError> {
        self.inner.create(key, value)
    }

    fn conditional_put(
        &self,
        key: &EventCode,
        expected: Version,
        value: ActivationEvent,
    ) -> Result<Version, StoreError> {
        if *self.contended.lock().unwrap() {
            if let Some(current) = self.inner.get(key)? {
                self.inner.conditional_put(key, current.version, current.value)?;
            }
        }
        self.inner.conditional_put(key, expected, value)
    }

    fn list(&self) -> Result<Vec<(EventCode, Versioned<ActivationEvent>)>, StoreError> {
        self.inner.list()
    }
}

#[test]
fn contention_on_an_open_event_is_not_charged_to_the_signup() {
    let events = Arc::new(ContendedEvents::new());
    let stores = Stores {
        events: events.clone(),
        ..Stores::in_memory()
    };
    let h = harness_with(manual_approval(), stores);
    open_event(&h, "summit", 10);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();

    events.set(true);
    let err = h.service.redeem(&key, "summit").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientConflict);
    assert_eq!(h.service.signup(&key).unwrap().attempts(), 0);
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 0);

    events.set(false);
    h.service.redeem(&key, "summit").unwrap();
    assert_eq!(h.service.get_event("summit").unwrap().activation_count, 1);
}

#[test]
fn status_serializes_with_wire_names() {
    let mut config = no_verification();
    config.approval.automatic = true;
    let h = harness(config);
    let key = h.service.intake(claims("arnold", "arnold@some.domain")).unwrap();
    h.service.mark_provisioned(&key, "arnold").unwrap();

    let json = serde_json::to_value(h.service.get_status(&key).unwrap()).unwrap();
    assert_eq!(json["compliantUsername"], "arnold");
    assert_eq!(json["givenName"], "Arnold");
    assert_eq!(json["status"]["verificationRequired"], false);
    assert_eq!(json["consoleURL"], "https://console.member-1.example.com/");
    assert_eq!(json["apiEndpoint"], "https://api.member-1.example.com:6443");
    assert!(json.get("proxyURL").is_none());
}
