//! Shared harness: a router over `MemoryStore`, driven with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use sentinel_api::{AppState, config::ApiConfig};
use sentinel_core::config::AuthConfig;
use sentinel_core::notify::LogNotifier;
use sentinel_core::store::MemoryStore;
use sentinel_core::Authenticator;
use serde_json::Value;
use tower::ServiceExt;

pub const API_KEY: &str = "backend-key";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

pub fn app() -> TestApp {
    app_with(|_| {})
}

/// Build the harness after adjusting the API config.
pub fn app_with(configure: impl FnOnce(&mut ApiConfig)) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let auth = AuthConfig::new("access-secret", "refresh-secret", "enc-key");
    let mut config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: "postgres://unused".into(),
        introspection_api_keys: vec![API_KEY.into()],
        trust_forwarded_for: true,
        auth: auth.clone(),
    };
    configure(&mut config);
    let state = AppState {
        auth: Arc::new(Authenticator::new(
            store.clone(),
            auth,
            Arc::new(LogNotifier),
        )),
        config,
    };
    TestApp {
        store,
        router: sentinel_api::router(state),
    }
}

impl TestApp {
    /// Send a request and return status plus parsed JSON body (`Null` when empty).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.call_with(method, uri, bearer, &[], body).await
    }

    pub async fn call_with(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, username: &str, password: &str) -> Value {
        let (status, json) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }

    /// Log in and return `(access, refresh)`.
    pub async fn login(&self, identifier: &str, password: &str) -> (String, String) {
        let (status, json) = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(serde_json::json!({ "identifier": identifier, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        (
            json["accessToken"].as_str().unwrap().to_string(),
            json["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}
