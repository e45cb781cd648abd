use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quota_gateway::config::Args;
use quota_gateway::identity::IdentitySource;
use quota_gateway::load_balancer::{LoadBalancer, health_checker};
use quota_gateway::rate_limit::{AdmissionGuard, PolicyClass, QuotaStore};
use quota_gateway::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quota_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let policies = args
        .policy_registry()
        .context("invalid rate limit configuration")?;

    // the only quota store in the process; every route shares it
    let store = Arc::new(QuotaStore::new().with_high_water_mark(args.sweep_threshold));
    let guard = AdmissionGuard::new(store, policies);

    let load_balancer = Arc::new(
        LoadBalancer::new(&args.backends).context("at least one backend is required")?,
    );
    let client = reqwest::Client::new();

    tokio::spawn(health_checker(
        load_balancer.clone(),
        client.clone(),
        args.health_interval(),
    ));

    let identity_source = if args.trust_identity_headers {
        IdentitySource::TrustedHeaders
    } else {
        IdentitySource::PeerAddress
    };
    info!(?identity_source, "Caller identity source");

    let state = AppState::new(client, load_balancer, guard, identity_source);
    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Gateway running on http://localhost:{}", args.port);
    for class in PolicyClass::ALL {
        let policy = state.guard.policies().resolve(class);
        info!(
            "Rate limit {}: {} requests per {}s",
            class,
            policy.max_requests(),
            policy.window_ms() / 1000
        );
    }

    // peer address is the identity fallback for anonymous callers
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
