//! Shared harness for the router-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use verity_api::services::{StaticVerifier, VerificationOutcome};
use verity_api::spreadsheet::{cells_for, CellValue};
use verity_api::{
    create_api_router, generate_jwt_token, hash_password, ApiConfig, AppState, AuthConfig,
    JwtSecret,
};
use verity_core::{AdminUser, Clock, DiplomaField, DiplomaInput};
use verity_test_utils::{ManualClock, MockStorage, RegistryStore};

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const ADMIN_USERNAME: &str = "registrar";
pub const ADMIN_PASSWORD: &str = "correct horse battery";
pub const CLIENT_IP: &str = "203.0.113.7";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: MockStorage,
    pub clock: Arc<ManualClock>,
}

/// Build `AppState` over `MockStorage` with a passing verifier.
pub fn test_state() -> (AppState, MockStorage, Arc<ManualClock>) {
    test_state_with(VerificationOutcome::Passed { score: Some(0.9) })
}

pub fn test_state_with(verification: VerificationOutcome) -> (AppState, MockStorage, Arc<ManualClock>) {
    let storage = MockStorage::new();
    let clock = Arc::new(ManualClock::default());

    let config = ApiConfig {
        environment: "test".to_string(),
        flood_limit_enabled: false,
        ..ApiConfig::default()
    };
    let auth = AuthConfig {
        jwt_secret: JwtSecret::new(TEST_JWT_SECRET.to_string()).expect("test secret"),
        ..AuthConfig::default()
    }
    .with_clock(clock.clone());

    let state = AppState::with_clock(
        Arc::new(storage.clone()),
        None,
        config,
        auth,
        Arc::new(StaticVerifier(verification)),
        clock.clone(),
    );
    (state, storage, clock)
}

impl TestApp {
    pub fn new() -> Self {
        Self::from_state(test_state())
    }

    pub fn with_verification(verification: VerificationOutcome) -> Self {
        Self::from_state(test_state_with(verification))
    }

    fn from_state((state, storage, clock): (AppState, MockStorage, Arc<ManualClock>)) -> Self {
        let router = create_api_router(state.clone()).expect("router");
        Self {
            router,
            state,
            storage,
            clock,
        }
    }

    /// Session cookie header value for a fresh admin token.
    pub fn admin_cookie(&self) -> String {
        let token = generate_jwt_token(&self.state.auth, Uuid::now_v7(), ADMIN_USERNAME)
            .expect("token");
        format!("{}={}", self.state.auth.cookie_name, token)
    }

    /// Store an active admin account with a real argon2 hash.
    pub async fn seed_admin(&self) -> AdminUser {
        let admin = AdminUser {
            id: Uuid::now_v7(),
            username: ADMIN_USERNAME.to_string(),
            password_hash: hash_password(ADMIN_PASSWORD).expect("hash"),
            display_name: Some("Registrar".to_string()),
            is_active: true,
            last_login_at: None,
            created_at: self.clock.now(),
        };
        self.storage.admin_insert(&admin).await.expect("seed admin");
        admin
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        TestResponse {
            status,
            headers,
            bytes: bytes.to_vec(),
        }
    }

    pub async fn search(&self, body: Value) -> TestResponse {
        self.send(json_request("POST", "/api/v1/search", None, &body))
            .await
    }

    pub async fn admin_json(&self, method: &str, uri: &str, body: Option<&Value>) -> TestResponse {
        let cookie = self.admin_cookie();
        let request = match body {
            Some(body) => json_request(method, uri, Some(&cookie), body),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::COOKIE, cookie)
                .header("x-forwarded-for", CLIENT_IP)
                .body(Body::empty())
                .expect("request"),
        };
        self.send(request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("JSON body")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Workbook with the full header row and one data row per input.
pub fn workbook(rows: &[DiplomaInput]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, field) in DiplomaField::ALL.iter().enumerate() {
        sheet
            .write_string(0, col as u16, field.column_label())
            .expect("header");
    }
    for (index, input) in rows.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, (_, value)) in cells_for(input).into_iter().enumerate() {
            match value {
                CellValue::Number(n) => {
                    sheet.write_number(row, col as u16, n).expect("cell");
                }
                CellValue::Empty => {}
                other => {
                    sheet
                        .write_string(row, col as u16, other.display())
                        .expect("cell");
                }
            }
        }
    }
    workbook.save_to_buffer().expect("workbook")
}

/// `multipart/form-data` upload with a single `file` field.
pub fn multipart_upload(uri: &str, cookie: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "verity-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .header("x-forwarded-for", CLIENT_IP)
        .body(Body::from(body))
        .expect("request")
}
