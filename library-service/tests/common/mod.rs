#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use library_service::{
    build_router,
    config::LibraryConfig,
    services::MemoryMailer,
    store::{CredentialStore, MemoryStore},
    AppState,
};
use serde_json::{json, Value};
use service_core::middleware::rate_limit::RateLimitSettings;
use std::sync::{Arc, Once};
use std::time::Duration;
use tower::ServiceExt;

static TRACING: Once = Once::new();

fn init_test_tracing() {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
                .with_test_writer()
                .init();
        }
    });
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    /// App over an in-memory store with the limiter switched off.
    pub fn spawn() -> Self {
        Self::with_limiter(RateLimitSettings {
            enabled: false,
            ..RateLimitSettings::default()
        })
    }

    pub fn with_limiter(limiter: RateLimitSettings) -> Self {
        init_test_tracing();

        let config = LibraryConfig {
            limiter,
            store_timeout: Duration::from_secs(1),
            ..LibraryConfig::default()
        };

        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(config, store.clone(), mailer.clone())
            .expect("Failed to build test state");

        TestApp {
            router: build_router(state.clone()),
            store,
            mailer,
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7");

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    /// Activation token mailed to `email`. Delivery runs on a spawned task.
    pub async fn activation_token_for(&self, email: &str) -> String {
        for _ in 0..50 {
            if let Some(mail) = self.mailer.last_to(email) {
                return mail.data["activation_token"]
                    .as_str()
                    .expect("activation token in mail")
                    .to_string();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no activation mail sent to {}", email);
    }

    pub async fn register(&self, name: &str, email: &str) -> TestResponse {
        self.post(
            "/v1/users",
            None,
            json!({ "name": name, "email": email, "password": "pa55word-long" }),
        )
        .await
    }

    pub async fn login(&self, email: &str) -> String {
        let res = self
            .post(
                "/v1/tokens/authentication",
                None,
                json!({ "email": email, "password": "pa55word-long" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "login failed: {}", res.body);
        res.body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Register without activating and return an authentication token.
    pub async fn inactive_user(&self, email: &str) -> String {
        let res = self.register("Inactive", email).await;
        assert_eq!(res.status, StatusCode::ACCEPTED);
        self.login(email).await
    }

    /// Register, activate, grant `extra` capabilities and log in.
    pub async fn activated_user(&self, email: &str, extra: &[&str]) -> String {
        let res = self.register("Reader", email).await;
        assert_eq!(res.status, StatusCode::ACCEPTED, "register failed: {}", res.body);
        let user_id = res.body["user"]["id"].as_i64().unwrap();

        let activation = self.activation_token_for(email).await;
        let res = self
            .request(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(json!({ "token": activation })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "activation failed: {}", res.body);

        if !extra.is_empty() {
            self.store.grant_permissions(user_id, extra).await.unwrap();
        }

        self.login(email).await
    }
}

pub fn event_body(card_id: i64, title: &str) -> Value {
    json!({
        "title": title,
        "description": "Quarterly planning session",
        "text_blocks": ["Agenda", "Notes"],
        "date": "2099-06-01",
        "card_id": card_id,
    })
}
