#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use eventdesk::config::Config;
use eventdesk::services::{MailError, Mailer, ManualClock};
use eventdesk::state::SharedState;
use http_body_util::BodyExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const PASSWORD: &str = "Secret1";

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the newest mail to `to` whose body contains `marker`.
    pub fn token_for(&self, to: &str, marker: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.iter().rev().find_map(|mail| {
            if mail.to != to {
                return None;
            }
            let start = mail.body.find(marker)? + marker.len();
            let token: String = mail.body[start..]
                .chars()
                .take_while(char::is_ascii_alphanumeric)
                .collect();
            Some(token)
        })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.server.public_url = Some("http://eventdesk.test".to_string());
    config.observability.metrics_enabled = false;
    config.uploads.root_path = std::env::temp_dir()
        .join(format!("eventdesk-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    config
}

pub struct TestApp {
    pub router: Router,
    pub shared: Arc<SharedState>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    /// Clock starts at 2025-01-01T00:00:00Z.
    pub async fn spawn() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let shared = Arc::new(
            SharedState::build(test_config(), clock.clone(), mailer.clone())
                .await
                .expect("Failed to build shared state"),
        );
        let state = eventdesk::api::create_app_state(shared.clone(), None);

        Self {
            router: eventdesk::api::router(state),
            shared,
            clock,
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session_token={token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn get_with_cookies(&self, uri: &str, cookies: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        session: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session_token={token}"));
        }
        self.send(builder.body(Body::from(form_body(fields))).unwrap())
            .await
    }

    pub async fn wait_for_token(&self, to: &str, marker: &str) -> String {
        for _ in 0..100 {
            if let Some(token) = self.mailer.token_for(to, marker) {
                return token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no mail to {to} containing {marker}");
    }

    pub async fn register(&self, username: &str, email: &str) -> Response<Body> {
        self.post_form(
            "/auth/register",
            &[
                ("username", username),
                ("email", email),
                ("password", PASSWORD),
            ],
            None,
        )
        .await
    }

    /// Registers and verifies an account, then logs in; returns the session token.
    pub async fn sign_up(&self, username: &str) -> String {
        let email = format!("{username}@x.com");
        let response = self.register(username, &email).await;
        assert_eq!(response.status(), StatusCode::OK);

        let token = self.wait_for_token(&email, "verify?token=").await;
        let response = self
            .get(&format!("/auth/verify?token={token}"), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        self.login(username, PASSWORD).await
    }

    pub async fn login(&self, identifier: &str, password: &str) -> String {
        let response = self
            .post_form(
                "/auth/login",
                &[("identifier", identifier), ("password", password)],
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        cookie_value(&response, "session_token").expect("login did not set a session cookie")
    }

    pub async fn sign_up_admin(&self, username: &str) -> String {
        let token = self.sign_up(username).await;
        assert!(self.shared.auth_service.grant_admin(username).await.unwrap());
        token
    }

    pub async fn create_event(
        &self,
        session: &str,
        title: &str,
        status: &str,
    ) -> Response<Body> {
        self.post_form(
            "/events/create",
            &[
                ("title", title),
                ("description", "An event worth attending"),
                ("start_time", "2025-01-10T10:00"),
                ("end_time", "2025-01-10T11:00"),
                ("location", "Main hall"),
                ("status", status),
            ],
            Some(session),
        )
        .await
    }

    pub async fn dashboard(&self, session: &str, page: Option<&str>) -> serde_json::Value {
        let uri = page.map_or_else(
            || "/user/dashboard".to_string(),
            |p| format!("/user/dashboard?page={p}"),
        );
        let response = self.get(&uri, Some(session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    /// Id of the first listed event with `title`, as seen by `session`.
    pub async fn event_id(&self, session: &str, title: &str) -> String {
        let body = self.dashboard(session, None).await;
        body["data"]["events"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["title"] == title)
            .and_then(|e| e["id"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| panic!("event {title} not listed"))
    }
}

pub fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The full `Set-Cookie` line for `name`, if the response sets it.
pub fn set_cookie_line(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|line| line.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    let line = set_cookie_line(response, name)?;
    let pair = line.split(';').next()?;
    let value = pair.split_once('=')?.1;
    (!value.is_empty()).then(|| value.to_string())
}
