//! Integration tests for peal-ui routes
//!
//! Each test builds the router over a JSON store in a temp directory and
//! drives it with `oneshot` requests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use peal_common::auth::{SessionStore, SharedSecret};
use peal_common::json_store::JsonStore;
use peal_common::models::{Location, MethodFields, PracticeFields};
use peal_common::Storage;
use peal_ui::{build_router, AppState};

const PASSWORD: &str = "admin123";

struct TestApp {
    app: Router,
    storage: Arc<dyn Storage>,
    _dir: TempDir,
}

async fn setup_app() -> TestApp {
    setup_app_with_sessions(SessionStore::new()).await
}

async fn setup_app_with_sessions(sessions: SessionStore) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(&dir.path().join("data.json")).await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(store);
    let state = AppState::with_sessions(storage.clone(), SharedSecret::new(PASSWORD), sessions);
    TestApp {
        app: build_router(state),
        storage,
        _dir: dir,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Log in and return the `name=value` cookie pair
async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post_form("/login", &format!("password={}", PASSWORD), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

// =============================================================================
// Health and login gate
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let t = setup_app().await;
    let response = t.app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "peal-ui");
    assert_eq!(body["backend"], "json");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_pages_redirect_to_login_without_session() {
    let t = setup_app().await;
    for uri in ["/", "/employees", "/touches/new"] {
        let response = t.app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/login");
    }

    let forged = format!("peal_session={}", uuid::Uuid::new_v4());
    let response = t.app.oneshot(get("/", Some(&forged))).await.unwrap();
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let t = setup_app().await;
    let response = t
        .app
        .oneshot(post_form("/login", "password=nope", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(body_text(response.into_body()).await.contains("Incorrect password"));
}

#[tokio::test]
async fn test_expired_session_redirects_to_login() {
    let t = setup_app_with_sessions(SessionStore::with_ttl(Duration::ZERO)).await;
    let cookie = login(&t.app).await;

    let response = t.app.oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_session_cookie_carries_max_age() {
    let t = setup_app_with_sessions(SessionStore::with_ttl(Duration::from_secs(90 * 60))).await;
    let response = t
        .app
        .oneshot(post_form("/login", &format!("password={}", PASSWORD), None))
        .await
        .unwrap();
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=5400"));
}

#[tokio::test]
async fn test_login_grants_access_until_logout() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let response = t.app.clone().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response.into_body()).await.contains("Dashboard"));

    let response = t
        .app
        .clone()
        .oneshot(post_form("/logout", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login");

    let response = t.app.oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/login");
}

// =============================================================================
// Entity pages
// =============================================================================

#[tokio::test]
async fn test_create_employee_through_form() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let response = t
        .app
        .clone()
        .oneshot(post_form(
            "/employees",
            "first_name=Ada&last_name=Lovelace&member=on&resident=Regional",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/employees");

    let employees = t.storage.list_employees().await.unwrap();
    assert_eq!(employees.len(), 1);
    assert!(employees[0].member);
    assert_eq!(employees[0].full_name(), "Ada Lovelace");

    let response = t.app.oneshot(get("/employees", Some(&cookie))).await.unwrap();
    assert!(body_text(response.into_body()).await.contains("Ada Lovelace"));
}

#[tokio::test]
async fn test_blank_name_is_unprocessable() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let response = t
        .app
        .oneshot(post_form(
            "/employees",
            "first_name=+&last_name=Lovelace&resident=Local",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(t.storage.list_employees().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_touch_number_is_conflict() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let practice = t
        .storage
        .create_practice(PracticeFields {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: Location::Remote,
        })
        .await
        .unwrap();
    let method = t
        .storage
        .create_method(MethodFields {
            name: "Plain Bob".to_string(),
            code: None,
        })
        .await
        .unwrap();
    let form = format!(
        "practice_id={}&method_id={}&touch_number=1&conductor=",
        practice.id, method.id
    );

    let response = t
        .app
        .clone()
        .oneshot(post_form("/touches", &form, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/touches?date=01-06-2024");

    let response = t
        .app
        .clone()
        .oneshot(post_form("/touches", &form, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(t.storage.list_touches().await.unwrap().len(), 1);

    let response = t
        .app
        .oneshot(get("/touches?date=01-06-2024", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response.into_body()).await.contains("Plain Bob"));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let uri = format!("/methods/{}/edit", uuid::Uuid::new_v4());
    let response = t.app.oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_touch_suggests_next_number() {
    let t = setup_app().await;
    let cookie = login(&t.app).await;

    let practice = t
        .storage
        .create_practice(PracticeFields {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: Location::OfficeB,
        })
        .await
        .unwrap();
    let method = t
        .storage
        .create_method(MethodFields {
            name: "Grandsire".to_string(),
            code: None,
        })
        .await
        .unwrap();
    t.storage
        .create_touch(peal_common::models::TouchFields {
            practice_id: practice.id,
            method_id: method.id,
            touch_number: 1,
            conductor_id: None,
            bells: vec![],
        })
        .await
        .unwrap();

    let uri = format!("/touches/new?practice_id={}", practice.id);
    let response = t.app.oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response.into_body()).await;
    assert!(body.contains(r#"name="touch_number" min="1" max="12" value="2""#));
}
