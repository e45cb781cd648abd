use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use axum::response::Response;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use quota_gateway::identity::IdentitySource;
use quota_gateway::load_balancer::LoadBalancer;
use quota_gateway::rate_limit::{
    AdmissionGuard, ManualClock, Policy, PolicyRegistry, QuotaStore,
};
use quota_gateway::{AppState, build_router};

const START_MS: u64 = 1_700_000_000_000;

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    upstream_hits: Arc<AtomicUsize>,
}

// Echoing stand-in for an AI backend that counts every request it sees.
async fn spawn_upstream(hits: Arc<AtomicUsize>) -> String {
    let echo_hits = hits.clone();
    let tags_hits = hits.clone();
    let app = Router::new()
        .route(
            "/api/generate",
            post(move |body: Bytes| {
                echo_hits.fetch_add(1, Ordering::SeqCst);
                async move { ([(CONTENT_TYPE, "application/json")], body) }
            }),
        )
        .route(
            "/v1/audio/transcriptions",
            post(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                async { "transcript" }
            }),
        )
        .route(
            "/api/tags",
            get(move || {
                tags_hits.fetch_add(1, Ordering::SeqCst);
                async { axum::Json(serde_json::json!({ "models": [] })) }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// Callers identify themselves with headers, as behind the auth proxy.
async fn harness(registry: PolicyRegistry) -> Harness {
    harness_with(registry, IdentitySource::TrustedHeaders).await
}

async fn harness_with(registry: PolicyRegistry, identity_source: IdentitySource) -> Harness {
    let upstream_hits = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_upstream(upstream_hits.clone()).await;

    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(QuotaStore::with_clock(clock.clone()));
    let guard = AdmissionGuard::new(store, registry);
    let load_balancer = Arc::new(LoadBalancer::new(&upstream).unwrap());
    let state = AppState::new(reqwest::Client::new(), load_balancer, guard, identity_source);

    Harness {
        app: build_router(state),
        clock,
        upstream_hits,
    }
}

fn tight(max: u32) -> PolicyRegistry {
    let policy = Policy::new(max, Duration::from_secs(60)).unwrap();
    PolicyRegistry::new(policy, policy, policy)
}

fn generate(user: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("x-user-id", user)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"model":"llama3","prompt":"hi"}"#))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header(response: &Response, name: &str) -> String {
    response.headers()[name].to_str().unwrap().to_string()
}

#[tokio::test]
async fn admitted_request_is_forwarded_with_quota_headers() {
    let h = harness(tight(3)).await;

    let response = send(&h.app, generate("u1")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), "3");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "2");
    assert_eq!(
        header(&response, "x-ratelimit-reset"),
        ((START_MS + 60_000) / 1000).to_string()
    );
    assert_eq!(header(&response, "content-type"), "application/json");
    assert_eq!(
        body_string(response).await,
        r#"{"model":"llama3","prompt":"hi"}"#
    );
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn over_quota_request_is_rejected_before_upstream() {
    let h = harness(tight(3)).await;

    for expected in ["2", "1", "0"] {
        let response = send(&h.app, generate("u1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-remaining"), expected);
    }

    let denied = send(&h.app, generate("u1")).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, "x-ratelimit-remaining"), "0");

    let body: serde_json::Value = serde_json::from_str(&body_string(denied).await).unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["policy"], "AI_ENDPOINTS");
    assert_eq!(body["reset_at"], (START_MS + 60_000) / 1000);

    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn quota_comes_back_after_the_window() {
    let h = harness(tight(1)).await;

    assert_eq!(send(&h.app, generate("u1")).await.status(), StatusCode::OK);
    for _ in 0..5 {
        assert_eq!(
            send(&h.app, generate("u1")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    h.clock.advance(60_000);
    let response = send(&h.app, generate("u1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
}

#[tokio::test]
async fn users_and_classes_have_separate_buckets() {
    let h = harness(tight(1)).await;

    assert_eq!(send(&h.app, generate("alice")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&h.app, generate("alice")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&h.app, generate("bob")).await.status(), StatusCode::OK);

    // alice's AI quota is gone, her transcription quota is not
    let transcribe = Request::builder()
        .method("POST")
        .uri("/v1/audio/transcriptions")
        .header("x-user-id", "alice")
        .body(Body::from("audio"))
        .unwrap();
    let response = send(&h.app, transcribe).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "transcript");
}

#[tokio::test]
async fn anonymous_callers_are_counted_by_address() {
    let h = harness(tight(1)).await;

    let tags = |addr: &'static str| {
        Request::builder()
            .uri("/api/tags")
            .header("x-forwarded-for", addr)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&h.app, tags("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&h.app, tags("203.0.113.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&h.app, tags("203.0.113.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn identity_headers_are_ignored_by_default() {
    let h = harness_with(tight(1), IdentitySource::PeerAddress).await;
    let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();

    let mut admitted = 0;
    for i in 0..20 {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header("x-user-id", format!("someone-{i}"))
            .header("x-forwarded-for", format!("10.0.0.{i}"))
            .body(Body::from("{}"))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        if send(&h.app, request).await.status() == StatusCode::OK {
            admitted += 1;
        }
    }

    // every request lands in the peer's bucket
    assert_eq!(admitted, 1);
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_without_identity_fails_without_side_effects() {
    let h = harness(tight(5)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&h.app, request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("x-ratelimit-remaining").is_none());
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_the_limit() {
    let h = harness(tight(10)).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move { app.oneshot(generate("u1")).await.unwrap().status() })
        })
        .collect();

    let mut ok = 0;
    let mut denied = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => denied += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((ok, denied), (10, 6));
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn health_and_metrics_are_not_guarded() {
    let h = harness(tight(1)).await;
    send(&h.app, generate("u1")).await;

    for _ in 0..3 {
        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = send(&h.app, health).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tracked_quota_keys"], 1);
    }

    let metrics = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = send(&h.app, metrics).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("gateway_admissions_total"));
}

#[tokio::test]
async fn default_registry_limits_ai_endpoints_at_one_hundred() {
    let h = harness(PolicyRegistry::default()).await;

    let response = send(&h.app, generate("u1")).await;
    assert_eq!(header(&response, "x-ratelimit-limit"), "100");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "99");
    assert_eq!(
        header(&response, "x-ratelimit-reset"),
        ((START_MS + 3_600_000) / 1000).to_string()
    );
}
