//! Health endpoint tests

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use di_axum::RouterServiceProviderExtensions;
use serde_json::Value;
use support_desk::api::health;
use support_desk::core::faq_cache::FaqCache;
use support_desk::infrastructure::entities::Category;
use support_desk::infrastructure::store::{NewTicket, TicketStore};
use tower::ServiceExt;

fn new_ticket(user_id: i64) -> NewTicket {
    NewTicket {
        user_id,
        name: "Alex".to_owned(),
        account_ref: None,
        category: Category::Other,
        description: "card declined".to_owned(),
        attachment: None,
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_on_empty_state() {
    let (provider, _, _) = common::container(&[]);
    let app = health::router().with_provider(provider);

    let (status, json) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["tickets_open"], 0);
    assert_eq!(json["faq_cache"], 0);
    assert!(json["uptime_s"].is_u64());
}

#[tokio::test]
async fn test_health_counts_only_unclosed_tickets() {
    let (provider, _, _) = common::container(&[]);
    let store = provider.get_required::<TicketStore>();
    let cache = provider.get_required::<FaqCache>();

    store.create(new_ticket(1), Utc::now()).await.unwrap();
    let second = store.create(new_ticket(2), Utc::now()).await.unwrap();
    let third = store.create(new_ticket(3), Utc::now()).await.unwrap();
    store.record_admin_reply(second.id, Utc::now()).await.unwrap();
    store.close(third.id).await.unwrap();
    cache
        .put("how do I reset my password?", "Use the reset link.".to_owned())
        .await;

    let (_, json) = get(health::router().with_provider(provider), "/healthz").await;

    assert_eq!(json["tickets_open"], 2);
    assert_eq!(json["faq_cache"], 1);
}

#[tokio::test]
async fn test_health_sees_tickets_opened_through_the_service() {
    let (provider, _, _) = common::container(&[]);
    let service = provider.get_required::<support_desk::core::services::SupportService>();

    service
        .store()
        .create(new_ticket(common::CLIENT), Utc::now())
        .await
        .unwrap();

    let (_, json) = get(health::router().with_provider(provider), "/healthz").await;

    assert_eq!(json["tickets_open"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (provider, _, _) = common::container(&[]);

    let (status, _) = get(health::router().with_provider(provider), "/tickets").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
