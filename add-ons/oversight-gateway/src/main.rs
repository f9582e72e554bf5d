//! Axum-based gateway for the learning oversight core. Config-driven via CoreConfig.

mod handlers;

use axum::{
    extract::State,
    http::{HeaderMap, Method},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use handlers::requests::{self, caller_role};
use oversight_core::{
    CoreConfig, DecisionReceiver, KnowledgeStore, ProposalPolicy, RequestRegistry, SledRequestStore,
};
use std::convert::Infallible;
use std::path::Path as StdPath;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Optional policy file under `storage_path`; the built-in default applies when it is missing.
const POLICY_FILE: &str = "policy.json";

/// Pre-flight check: verify both stores open and the port is available.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;

    print!("Checking request store... ");
    let store = SledRequestStore::open_path(config.requests_path())
        .map_err(|e| format!("request store LOCKED or inaccessible: {}", e))?;
    drop(store);
    println!("OK");

    print!("Checking knowledge store... ");
    let kb = KnowledgeStore::open_path(config.knowledge_path())
        .map_err(|e| format!("knowledge store LOCKED or inaccessible: {}", e))?;
    let status = kb.get_status();
    if !status.connected {
        return Err(format!(
            "knowledge tree unavailable: {}",
            status.error.unwrap_or_default()
        ));
    }
    drop(kb);
    println!("OK ({} entries)", status.entry_count);

    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("Port {} BLOCKED: {}", port, e));
        }
    }

    println!("\nSUCCESS: ready to start gateway.");
    Ok(())
}

fn load_policy(storage_path: &str) -> ProposalPolicy {
    let path = StdPath::new(storage_path).join(POLICY_FILE);
    match std::fs::read(&path) {
        Ok(bytes) => match ProposalPolicy::from_bytes(&bytes) {
            Some(policy) => {
                tracing::info!(target: "oversight::gateway", path = %path.display(), "Proposal policy loaded");
                policy
            }
            None => {
                tracing::warn!(target: "oversight::gateway", path = %path.display(), "Proposal policy unreadable; using default");
                ProposalPolicy::default()
            }
        },
        Err(_) => ProposalPolicy::default(),
    }
}

/// Opens both stores and builds the registry (which rebuilds its fingerprint index).
fn open_registry(config: &CoreConfig) -> Result<RequestRegistry, String> {
    let store = SledRequestStore::open_path(config.requests_path())
        .map_err(|e| format!("open request store: {}", e))?;
    let knowledge = KnowledgeStore::open_path(config.knowledge_path())
        .map_err(|e| format!("open knowledge store: {}", e))?;
    RequestRegistry::with_event_capacity(Arc::new(store), Arc::new(knowledge), config.event_capacity)
        .map_err(|e| format!("build registry: {}", e))
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[oversight-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("[oversight-gateway] config load failed: {}", e);
            std::process::exit(1);
        }
    };
    let registry = match open_registry(&config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("[oversight-gateway] {}", e);
            std::process::exit(1);
        }
    };
    let policy = Arc::new(load_policy(&config.storage_path));

    let app = build_app(AppState {
        config: Arc::clone(&config),
        registry,
        policy,
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("[oversight-gateway] bind {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!(target: "oversight::gateway", "{} listening on {}", config.app_name, addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(target: "oversight::gateway", error = %e, "Server stopped");
    }
}

fn build_app(state: AppState) -> Router {
    // CORS: allow Backend/API (8001-8099) and Frontend/UI (3001-3099) port ranges.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let s = origin.to_str().unwrap_or("");
            let port = s
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (3001..=3099).contains(&port) || (8001..=8099).contains(&port)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/requests", post(requests::submit))
        .route("/api/v1/requests/pending", get(requests::list_pending))
        .route("/api/v1/requests/:id", get(requests::get_request))
        .route("/api/v1/requests/:id/approve", post(requests::approve))
        .route("/api/v1/requests/:id/deny", post(requests::deny))
        .route("/api/v1/requests/:id/integrate", post(requests::retry_integration))
        .route("/api/v1/relevance", post(requests::relevance))
        .route("/api/v1/vault", get(requests::vault))
        .route("/api/v1/stats", get(requests::stats))
        .route("/api/v1/events", get(events_stream))
        .with_state(state)
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) registry: Arc<RequestRegistry>,
    pub(crate) policy: Arc<ProposalPolicy>,
}

/// GET /api/v1/health – liveness check for UI and scripts.
async fn health(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok", "app_name": state.config.app_name }))
}

/// GET /api/v1/events – Server-Sent Events stream of reviewer decisions.
async fn events_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(rx) = state.registry.subscribe_as(caller_role(&headers)) else {
        return requests::forbidden();
    };
    Sse::new(decision_stream(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
        .into_response()
}

fn decision_stream(
    mut rx: DecisionReceiver,
) -> impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(decision) => match Event::default().json_data(&decision) {
                    Ok(event) => yield Ok(event),
                    Err(e) => tracing::warn!(target: "oversight::gateway", error = %e, "Dropping unencodable decision event"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default().comment(format!("{} decision events dropped", n)));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use handlers::requests::ROLE_HEADER;
    use oversight_core::{KnowledgeItem, KnowledgeSink, MemoryRequestStore, SinkError, StoreOutcome};
    use tower::ServiceExt;

    fn test_config(storage: &StdPath) -> CoreConfig {
        CoreConfig {
            app_name: "Test Oversight".to_string(),
            storage_path: storage.to_string_lossy().into_owned(),
            ..CoreConfig::default()
        }
    }

    fn test_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let registry = open_registry(&config).unwrap();
        let app = build_app(AppState {
            config: Arc::new(config),
            registry: Arc::new(registry),
            policy: Arc::new(ProposalPolicy::default()),
        });
        (dir, app)
    }

    fn post_json(uri: &str, role: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(ROLE_HEADER, role)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_as(uri: &str, role: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(ROLE_HEADER, role)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit(app: &Router, title: &str, content: &str) -> Response {
        app.clone()
            .oneshot(post_json(
                "/api/v1/requests",
                "producer",
                serde_json::json!({ "title": title, "content": content, "category": "technical" }),
            ))
            .await
            .unwrap()
    }

    async fn submit_ok(app: &Router, title: &str, content: &str) -> String {
        let res = submit(app, title, content).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        body_json(res).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_reports_app_name() {
        let (_dir, app) = test_app();
        let res = app.oneshot(get_as("/api/v1/health", "producer")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["app_name"], "Test Oversight");
    }

    #[tokio::test]
    async fn test_rejections_look_the_same_for_every_cause() {
        let (_dir, app) = test_app();
        let denied = submit_ok(&app, "Py Release", "Python 3.14 ships faster startup").await;
        submit_ok(&app, "Waiting", "still pending").await;
        let res = app
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/requests/{}/deny", denied),
                "reviewer",
                serde_json::json!({ "reason": "not relevant" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "vaulted");

        let vaulted = submit(&app, "New title", "python 3.14  ships faster startup").await;
        let pending = submit(&app, "Other", "Still Pending").await;
        let policy = submit(&app, "Setup", "export API_KEY=abc123").await;
        for res in [vaulted, pending, policy] {
            assert_eq!(res.status(), StatusCode::CONFLICT);
            assert_eq!(body_json(res).await, serde_json::json!({ "status": "not_accepted" }));
        }
    }

    #[tokio::test]
    async fn test_blank_content_is_unprocessable() {
        let (_dir, app) = test_app();
        let res = submit(&app, "Title", "   ").await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_producer_cannot_decide_or_see_pending() {
        let (_dir, app) = test_app();
        let id = submit_ok(&app, "Topic A", "content A").await;

        let res = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/requests/{}/approve", id), "producer", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app.clone().oneshot(get_as(&format!("/api/v1/requests/{}", id), "producer")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app.clone().oneshot(get_as("/api/v1/requests/pending", "producer")).await.unwrap();
        assert_eq!(body_json(res).await, serde_json::json!([]));

        for uri in ["/api/v1/vault", "/api/v1/stats", "/api/v1/events"] {
            let res = app.clone().oneshot(get_as(uri, "producer")).await.unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{}", uri);
        }

        let res = app.oneshot(get_as("/api/v1/requests/pending", "reviewer")).await.unwrap();
        let json = body_json(res).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_approval_integrates_and_becomes_visible() {
        let (_dir, app) = test_app();
        let id = submit_ok(&app, "Topic A", "content A").await;

        let res = app
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/requests/{}/approve", id),
                "reviewer",
                serde_json::json!({ "notes": "useful" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "integrated");

        let res = app.clone().oneshot(get_as(&format!("/api/v1/requests/{}", id), "producer")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["content"], "content A");

        let res = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/requests/{}/deny", id), "reviewer", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/requests/{}/integrate", id), "reviewer", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app.oneshot(get_as("/api/v1/stats", "reviewer")).await.unwrap();
        let stats = body_json(res).await;
        assert_eq!(stats["integrated"], 1);
        assert_eq!(stats["pending"], 0);
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let (_dir, app) = test_app();
        let uri = format!("/api/v1/requests/{}/approve", uuid::Uuid::new_v4());
        let res = app.oneshot(post_json(&uri, "reviewer", serde_json::json!({}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_relevance_hides_vault_from_producer_only() {
        let (_dir, app) = test_app();
        let id = submit_ok(&app, "Py Release", "Python 3.14 ships faster startup").await;
        app.clone()
            .oneshot(post_json(&format!("/api/v1/requests/{}/deny", id), "reviewer", serde_json::json!({ "reason": "no" })))
            .await
            .unwrap();

        let check = |role: &'static str| {
            post_json(
                "/api/v1/relevance",
                role,
                serde_json::json!({ "content": "PYTHON 3.14 ships faster startup" }),
            )
        };
        let res = app.clone().oneshot(check("producer")).await.unwrap();
        assert_eq!(body_json(res).await, serde_json::json!({ "relevant": false }));
        let res = app.clone().oneshot(check("reviewer")).await.unwrap();
        assert_eq!(body_json(res).await, serde_json::json!({ "relevant": true }));

        let res = app.oneshot(get_as("/api/v1/vault", "reviewer")).await.unwrap();
        let vault = body_json(res).await;
        assert_eq!(vault.as_array().unwrap().len(), 1);
        assert_eq!(vault[0]["reason"], "no");
    }

    /// Knowledge sink that is offline for its first write.
    struct OfflineOnce {
        failures_left: std::sync::atomic::AtomicUsize,
    }

    impl KnowledgeSink for OfflineOnce {
        fn store(&self, _item: &KnowledgeItem) -> Result<StoreOutcome, SinkError> {
            use std::sync::atomic::Ordering;
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError("knowledge store offline".to_string()));
            }
            Ok(StoreOutcome::Inserted)
        }
    }

    #[tokio::test]
    async fn test_offline_knowledge_store_is_503_until_retried() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(OfflineOnce {
            failures_left: std::sync::atomic::AtomicUsize::new(1),
        });
        let registry = RequestRegistry::new(Arc::new(MemoryRequestStore::new()), sink).unwrap();
        let app = build_app(AppState {
            config: Arc::new(test_config(dir.path())),
            registry: Arc::new(registry),
            policy: Arc::new(ProposalPolicy::default()),
        });
        let id = submit_ok(&app, "Topic A", "content A").await;

        let res = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/requests/{}/approve", id), "reviewer", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let res = app.clone().oneshot(get_as(&format!("/api/v1/requests/{}", id), "reviewer")).await.unwrap();
        assert_eq!(body_json(res).await["status"], "approved");

        let res = app
            .oneshot(post_json(&format!("/api/v1/requests/{}/integrate", id), "reviewer", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "integrated");
    }
}
