//! Status-code tests against the router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tollgate::{
    IdentityClaims, RecordingNotifier, SignupService, Stores, SystemClock, TollgateConfig,
};
use tower::ServiceExt;

use crate::auth::{ADMIN_ROLE, AuthService, JwtConfig};
use crate::routes::router;
use crate::state::AppState;

struct TestApp {
    app: Router,
    auth: Arc<AuthService>,
    notifier: Arc<RecordingNotifier>,
}

fn app(config: TollgateConfig) -> TestApp {
    let auth = Arc::new(AuthService::new(JwtConfig::new("test-secret")));
    let notifier = Arc::new(RecordingNotifier::new());
    let service = SignupService::new(
        config,
        Stores::in_memory(),
        Arc::new(SystemClock),
        notifier.clone(),
    );
    TestApp {
        app: router(AppState::new(Arc::new(service), auth.clone())),
        auth,
        notifier,
    }
}

fn identity(username: &str) -> IdentityClaims {
    IdentityClaims {
        sub: format!("{username}-sub"),
        email: format!("{username}@some.domain"),
        given_name: "Arnold".to_string(),
        preferred_username: Some(username.to_string()),
        ..Default::default()
    }
}

impl TestApp {
    fn token(&self, username: &str) -> String {
        self.auth.issue(&identity(username), vec![]).unwrap()
    }

    fn admin_token(&self) -> String {
        self.auth
            .issue(&identity("operator"), vec![ADMIN_ROLE.to_string()])
            .unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let t = app(TollgateConfig::default());
    let (status, body) = t.call(Method::POST, "/api/v1/signup", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "no token found");
}

#[tokio::test]
async fn garbage_tokens_are_unauthorized() {
    let t = app(TollgateConfig::default());
    let (status, body) = t
        .call(Method::GET, "/api/v1/signup", Some("1223123123"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token contains an invalid number of segments");
}

#[tokio::test]
async fn expired_tokens_are_unauthorized() {
    let t = app(TollgateConfig::default());
    let issued = (Utc::now() - Duration::hours(3)).timestamp() as u64;
    let token = t
        .auth
        .sign(&t.auth.claims(&identity("arnold"), vec![], issued))
        .unwrap();

    let (status, body) = t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("token is expired by "));
}

// ============================================================================
// Signup
// ============================================================================

#[tokio::test]
async fn signup_then_status() {
    let t = app(TollgateConfig::default());
    let token = t.token("arnold");

    let (status, _) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "arnold");
    assert_eq!(body["compliantUsername"], "");
    assert_eq!(body["status"]["ready"], false);
    assert_eq!(body["status"]["reason"], "PendingApproval");
    assert_eq!(body["status"]["verificationRequired"], true);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let t = app(TollgateConfig::default());
    let token = t.token("arnold");
    t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;

    let (status, body) = t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);
    assert_eq!(body["status"], "Conflict");
    assert_eq!(
        body["message"],
        "signup [id: arnold-sub; username: arnold]. Unable to create signup because there is already an active signup with such ID"
    );
    assert_eq!(body["details"], "error creating signup");
}

#[tokio::test]
async fn reserved_username_is_forbidden() {
    let t = app(TollgateConfig::default());
    let token = t.token("test-crtadmin");

    let (status, body) = t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);
    assert_eq!(body["message"], "forbidden: failed to create signup for test-crtadmin");
    assert_eq!(body["details"], "error creating signup");
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn phone_verification_over_http() {
    let t = app(TollgateConfig::default());
    let token = t.token("arnold");
    t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;

    let phone = json!({ "country_code": "+61", "phone_number": "408999999" });
    let (status, _) = t
        .call(Method::PUT, "/api/v1/signup/verification", Some(&token), Some(phone))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t
        .call(Method::GET, "/api/v1/signup/verification/000", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "invalid code: the provided code does not match");

    let code = t.notifier.deliveries().pop().unwrap().code;
    let uri = format!("/api/v1/signup/verification/{}", code.as_str());
    let (status, _) = t.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(body["status"]["verificationRequired"], false);
}

#[tokio::test]
async fn phone_number_in_use_is_forbidden() {
    let t = app(TollgateConfig::default());
    let first = t.token("arnold");
    let second = t.token("bruce");
    let phone = json!({ "country_code": "+61", "phone_number": "408999999" });
    for token in [&first, &second] {
        t.call(Method::POST, "/api/v1/signup", Some(token), None).await;
    }

    let (status, _) = t
        .call(Method::PUT, "/api/v1/signup/verification", Some(&first), Some(phone.clone()))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t
        .call(Method::PUT, "/api/v1/signup/verification", Some(&second), Some(phone))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "Forbidden");
    assert_eq!(
        body["message"],
        "phone number already in use: cannot register using phone number: +61408999999"
    );
    assert_eq!(body["details"], "phone number already in use");
}

#[tokio::test]
async fn malformed_verification_body_is_a_bad_request() {
    let t = app(TollgateConfig::default());
    let token = t.token("arnold");
    t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;

    let (status, body) = t
        .call(Method::PUT, "/api/v1/signup/verification", Some(&token), Some(json!([1, 2])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

// ============================================================================
// Activation Codes
// ============================================================================

async fn create_event(t: &TestApp, code: &str, capacity: u32, offset: Duration) -> StatusCode {
    let now = Utc::now() + offset;
    let event = json!({
        "code": code,
        "startTime": now - Duration::hours(1),
        "endTime": now + Duration::hours(1),
        "maxAttendees": capacity,
        "userTier": "deactivate80",
        "spaceTier": "base1ns",
    });
    let admin = t.admin_token();
    t.call(Method::POST, "/api/v1/admin/events", Some(&admin), Some(event))
        .await
        .0
}

#[tokio::test]
async fn activation_codes_over_http() {
    let t = app(TollgateConfig::default());
    assert_eq!(create_event(&t, "summit", 1, Duration::zero()).await, StatusCode::CREATED);
    assert_eq!(
        create_event(&t, "later", 10, Duration::days(2)).await,
        StatusCode::CREATED
    );

    let tokens: Vec<String> = ["arnold", "bruce", "clark", "diana"]
        .iter()
        .map(|name| t.token(name))
        .collect();
    for token in &tokens {
        t.call(Method::POST, "/api/v1/signup", Some(token), None).await;
    }
    let redeem = |code: &str| json!({ "code": code });
    let uri = "/api/v1/signup/verification/activation-code";

    let (status, _) = t.call(Method::POST, uri, Some(&tokens[0]), Some(redeem("summit"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.call(Method::POST, uri, Some(&tokens[1]), Some(redeem("summit"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "over capacity");

    let (status, body) = t.call(Method::POST, uri, Some(&tokens[2]), Some(redeem("unknown"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "invalid code");

    let (status, body) = t.call(Method::POST, uri, Some(&tokens[3]), Some(redeem("later"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "not open yet");

    let admin = t.admin_token();
    let (status, body) = t
        .call(Method::GET, "/api/v1/admin/events/summit", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activationCount"], 1);
}

// ============================================================================
// Administration
// ============================================================================

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let t = app(TollgateConfig::default());
    let token = t.token("arnold");

    let (status, body) = t
        .call(Method::POST, "/api/v1/admin/signups/arnold/approve", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, _) = t
        .call(Method::GET, "/api/v1/admin/events/summit", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn approve_provision_and_deactivate() {
    let mut config = TollgateConfig::default();
    config.verification.enabled = false;
    let t = app(config);
    let token = t.token("arnold");
    let admin = t.admin_token();
    t.call(Method::POST, "/api/v1/signup", Some(&token), None).await;

    let (status, _) = t
        .call(Method::POST, "/api/v1/admin/signups/arnold/approve", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(body["status"]["reason"], "Provisioning");

    let (status, _) = t
        .call(
            Method::POST,
            "/api/v1/admin/signups/arnold/provisioned",
            Some(&admin),
            Some(json!({ "compliantUsername": "arnold" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(body["status"]["ready"], true);
    assert_eq!(body["compliantUsername"], "arnold");
    assert_eq!(body["consoleURL"], "https://console.member-1.example.com/");

    let (status, _) = t
        .call(Method::POST, "/api/v1/admin/signups/arnold/deactivate", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.call(Method::GET, "/api/v1/signup", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn approving_an_unknown_signup_is_not_found() {
    let t = app(TollgateConfig::default());
    let admin = t.admin_token();
    let (status, body) = t
        .call(Method::POST, "/api/v1/admin/signups/ghost/approve", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "Not Found");
}
