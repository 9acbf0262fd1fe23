use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use deployment::Deployment;
use serde_json::{Value, json};
use services::services::config::Config;
use test_support::TempDatabase;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{DeploymentImpl, http};

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// A router over a fresh temp-file database. Background workers are not
/// started; call [`TestApp::flush_events`] to dispatch notifications.
pub struct TestApp {
    pub deployment: DeploymentImpl,
    router: Router,
    _db: TempDatabase,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = TempDatabase::new().unwrap();
        let config = Config {
            database_url: db.url().to_string(),
            scheduler_enabled: false,
            ..Config::default()
        };
        let deployment = DeploymentImpl::from_config(config).await.unwrap();
        let router = http::router(deployment.clone());
        Self {
            deployment,
            router,
            _db: db,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn register(&self, name: &str, email: &str) -> TestUser {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        TestUser {
            id: body["data"]["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["data"]["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Creates workspace, space and project (key `ABC`) owned by `user` and
    /// returns the project id.
    pub async fn project(&self, user: &TestUser) -> Uuid {
        let token = Some(user.token.as_str());
        let (_, body) = self
            .request(
                Method::POST,
                "/api/workspaces",
                token,
                Some(json!({ "name": "Acme" })),
            )
            .await;
        let workspace_id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = self
            .request(
                Method::POST,
                &format!("/api/workspaces/{workspace_id}/spaces"),
                token,
                Some(json!({ "name": "Engineering" })),
            )
            .await;
        let space_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .request(
                Method::POST,
                &format!("/api/spaces/{space_id}/projects"),
                token,
                Some(json!({ "name": "Tracker", "key": "abc" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "project create failed: {body}");
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn flush_events(&self) {
        self.deployment.flush_events().await;
    }
}
