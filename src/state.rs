use std::sync::Arc;

use crate::identity::IdentitySource;
use crate::load_balancer::LoadBalancer;
use crate::rate_limit::AdmissionGuard;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub load_balancer: Arc<LoadBalancer>,
    pub guard: AdmissionGuard, // one per process, shared by every route
    pub identity_source: IdentitySource,
}

impl AppState {
    pub fn new(
        client: reqwest::Client,
        load_balancer: Arc<LoadBalancer>,
        guard: AdmissionGuard,
        identity_source: IdentitySource,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            load_balancer,
            guard,
            identity_source,
        })
    }
}
