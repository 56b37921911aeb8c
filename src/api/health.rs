//! Health endpoint

use crate::api::Uptime;
use crate::api::health::schemas::Health;
use crate::core::faq_cache::FaqCache;
use crate::infrastructure::store::TicketStore;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn healthz(
    Inject(uptime): Inject<Uptime>,
    Inject(store): Inject<TicketStore>,
    Inject(cache): Inject<FaqCache>,
) -> (StatusCode, Json<Health>) {
    let health = Health {
        status: "ok",
        uptime_s: uptime.secs(),
        tickets_open: store.open_count().await,
        faq_cache: cache.len().await,
    };

    (StatusCode::OK, Json(health))
}

pub mod schemas {
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct Health {
        pub status: &'static str,
        pub uptime_s: u64,
        pub tickets_open: usize,
        pub faq_cache: usize,
    }
}
