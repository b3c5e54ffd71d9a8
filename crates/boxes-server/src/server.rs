use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use boxes_core::RuleLimits;
use boxes_store::{BoxRepo, Database, UserRepo};
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{Authenticator, StoreAuthenticator};
use crate::routes;
use crate::service::BoxService;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub limits: RuleLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            limits: RuleLimits::default(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BoxService>,
    pub auth: Arc<dyn Authenticator>,
    pub db: Database,
}

impl AppState {
    /// State backed entirely by `db`, authenticating against its user table.
    pub fn new(db: Database, limits: RuleLimits) -> Self {
        Self {
            service: Arc::new(BoxService::new(BoxRepo::new(db.clone()), limits)),
            auth: Arc::new(StoreAuthenticator::new(UserRepo::new(db.clone()))),
            db,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/boxes/add/", post(routes::add_box))
        .route(
            "/boxes/update/{id}/",
            put(routes::update_box).patch(routes::update_box),
        )
        .route("/boxes/list/", get(routes::list_boxes))
        .route("/boxes/my-boxes/", get(routes::list_my_boxes))
        .route("/boxes/delete/{id}/", delete(routes::delete_box))
        .route("/health", get(routes::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve in a background task. Returns once the listener is bound.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(db, config.limits);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "boxes server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx,
        server,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running until
/// the runtime stops; [`ServerHandle::shutdown`] drains in-flight requests.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task did not finish cleanly");
        }
        tracing::info!("boxes server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Client, StatusCode};
    use secrecy::ExposeSecret;
    use serde_json::{json, Value};

    struct TestServer {
        handle: ServerHandle,
        client: Client,
        staff: String,
        other_staff: String,
        regular: String,
    }

    impl TestServer {
        async fn spawn() -> Self {
            let db = Database::in_memory().unwrap();
            let users = UserRepo::new(db.clone());
            let token = |name: &str, is_staff: bool| {
                users.create(name, is_staff).unwrap().1.expose_secret().to_string()
            };
            let staff = token("alice", true);
            let other_staff = token("bob", true);
            let regular = token("carol", false);

            let config = ServerConfig {
                port: 0,
                ..ServerConfig::default()
            };
            let handle = start(config, db).await.unwrap();
            Self {
                handle,
                client: Client::new(),
                staff,
                other_staff,
                regular,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.handle.addr())
        }

        async fn add(&self, token: &str, body: Value) -> reqwest::Response {
            self.client
                .post(self.url("/boxes/add/"))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        async fn list(&self, token: &str, path: &str) -> (StatusCode, Value) {
            let resp = self
                .client
                .get(self.url(path))
                .bearer_auth(token)
                .send()
                .await
                .unwrap();
            let status = resp.status();
            (status, resp.json().await.unwrap())
        }
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let server = TestServer::spawn().await;
        assert!(server.handle.port() > 0);
        let resp = reqwest::get(server.url("/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        server.handle.shutdown().await;
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let server = TestServer::spawn().await;

        let resp = server.client.get(server.url("/boxes/list/")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Authentication credentials were not provided.");

        let (status, body) = server.list("bogus", "/boxes/list/").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid token.");
    }

    #[tokio::test]
    async fn add_returns_created_record_with_derived_fields() {
        let server = TestServer::spawn().await;
        let resp = server
            .add(&server.staff, json!({"length": 2, "breadth": 3, "height": 4}))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["area"], 6.0);
        assert_eq!(body["volume"], 24.0);
        assert_eq!(body["owner"]["username"], "alice");
        assert!(body["createdAt"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn non_staff_cannot_add_or_list_own() {
        let server = TestServer::spawn().await;
        let resp = server
            .add(&server.regular, json!({"length": 1, "breadth": 1, "height": 1}))
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "forbidden");

        let (status, _) = server.list(&server.regular, "/boxes/my-boxes/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = server.list(&server.regular, "/boxes/list/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn area_violation_is_reported_but_record_persists() {
        let server = TestServer::spawn().await;
        let resp = server
            .add(&server.staff, json!({"length": 10, "breadth": 10, "height": 2}))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "area_exceeded");
        assert_eq!(
            body["detail"],
            "Average area of all added boxes should not exceed 100."
        );

        let resp = server
            .add(&server.staff, json!({"length": 10, "breadth": 10, "height": 1}))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let (_, listed) = server.list(&server.regular, "/boxes/list/").await;
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_filters_by_length_and_area() {
        let server = TestServer::spawn().await;
        for dims in [(6.0, 10.0, 1.0), (6.0, 20.0, 0.5), (4.0, 10.0, 1.0), (6.0, 10.0, -1.0)] {
            server
                .add(
                    &server.staff,
                    json!({"length": dims.0, "breadth": dims.1, "height": dims.2}),
                )
                .await;
        }

        let (status, body) = server
            .list(&server.staff, "/boxes/list/?lengthMoreThan=5&areaLessThan=80")
            .await;
        assert_eq!(status, StatusCode::OK);
        let found = body.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["length"], 6.0);
        assert_eq!(found[0]["breadth"], 10.0);
        assert_eq!(found[0]["height"], 1.0);

        let (status, body) = server.list(&server.staff, "/boxes/list/?area_less_than=oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn update_ignores_owner_and_created_at() {
        let server = TestServer::spawn().await;
        let created: Value = server
            .add(&server.staff, json!({"length": 1, "breadth": 2, "height": 3}))
            .await
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        let resp = server
            .client
            .patch(server.url(&format!("/boxes/update/{id}/")))
            .bearer_auth(&server.other_staff)
            .json(&json!({"height": 4, "owner": 99, "createdAt": "1999-01-01T00:00:00Z"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: Value = resp.json().await.unwrap();
        assert_eq!(updated["height"], 4.0);
        assert_eq!(updated["owner"]["username"], "alice");
        assert_eq!(updated["createdAt"], created["createdAt"]);

        let resp = server
            .client
            .put(server.url("/boxes/update/999/"))
            .bearer_auth(&server.staff)
            .json(&json!({"height": 4}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_by_non_owner_is_forbidden() {
        let server = TestServer::spawn().await;
        let created: Value = server
            .add(&server.staff, json!({"length": 1, "breadth": 1, "height": 1}))
            .await
            .json()
            .await
            .unwrap();
        let url = server.url(&format!("/boxes/delete/{}/", created["id"]));

        let resp = server
            .client
            .delete(&url)
            .bearer_auth(&server.other_staff)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let (_, listed) = server.list(&server.staff, "/boxes/list/").await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let resp = server
            .client
            .delete(&url)
            .bearer_auth(&server.staff)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    /// Accepts a single fixed token for one staff actor.
    struct FixedAuth(boxes_core::Actor);

    #[async_trait::async_trait]
    impl Authenticator for FixedAuth {
        async fn authenticate(&self, token: &str) -> Result<Option<boxes_core::Actor>, crate::ApiError> {
            Ok((token == "fixed").then(|| self.0.clone()))
        }
    }

    #[tokio::test]
    async fn router_accepts_a_substitute_authenticator() {
        let db = Database::in_memory().unwrap();
        let (user, _) = UserRepo::new(db.clone()).create("dana", true).unwrap();
        let state = AppState {
            auth: Arc::new(FixedAuth(boxes_core::Actor::from(&user))),
            ..AppState::new(db, RuleLimits::default())
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        let client = Client::new();
        let resp = client
            .post(format!("http://{addr}/boxes/add/"))
            .bearer_auth("fixed")
            .json(&json!({"length": 1, "breadth": 1, "height": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = client
            .get(format!("http://{addr}/boxes/my-boxes/"))
            .bearer_auth("other")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let server = TestServer::spawn().await;
        let resp = server
            .client
            .post(server.url("/boxes/add/"))
            .bearer_auth(&server.staff)
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn non_staff_with_malformed_body_is_forbidden() {
        let server = TestServer::spawn().await;
        let created: Value = server
            .add(&server.staff, json!({"length": 1, "breadth": 1, "height": 1}))
            .await
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        let requests = [
            server.client.post(server.url("/boxes/add/")),
            server.client.patch(server.url(&format!("/boxes/update/{id}/"))),
        ];
        for request in requests {
            let resp = request
                .bearer_auth(&server.regular)
                .header("content-type", "application/json")
                .body("{not json")
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["code"], "forbidden");
        }
    }

    #[tokio::test]
    async fn query_string_is_not_read_before_authentication() {
        let server = TestServer::spawn().await;
        for path in ["/boxes/list/?lengthMoreThan=oops", "/boxes/my-boxes/?length_more_than=1"] {
            let resp = server.client.get(server.url(path)).send().await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(resp.headers()["www-authenticate"], "Bearer");
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["code"], "not_authenticated");
        }

        let (status, body) = server.list(&server.staff, "/boxes/list/?lengthMoreThan=oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }
}
