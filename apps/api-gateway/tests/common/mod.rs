#![allow(dead_code)]

use axum_test::TestServer;
use chrono::Utc;
use http::HeaderValue;
use std::sync::Arc;
use vysion_core::{
    Persistence, TenantRepository,
    adapters::{InMemoryEventBus, InMemoryStore},
    config::Environment,
    domain::tenant::{Tenant, TenantSettings},
};
use vysion_gateway::{AppState, config::GatewayConfig, create_app};

pub const ADMIN_KEY: &str = "admin-key";

pub fn config(environment: Environment) -> GatewayConfig {
    GatewayConfig {
        environment,
        admin_api_key: Some(ADMIN_KEY.to_string()),
        ..GatewayConfig::default()
    }
}

pub fn server_with(config: GatewayConfig, persistence: Option<Persistence>) -> TestServer {
    let state = AppState {
        config: Arc::new(config),
        persistence,
        event_bus: Arc::new(InMemoryEventBus::default()),
    };
    TestServer::new(create_app(state)).expect("Failed to create TestServer")
}

/// Development gateway over an in-memory store.
pub fn server(store: &InMemoryStore) -> TestServer {
    server_with(
        config(Environment::Development),
        Some(Persistence::from_store(store.clone())),
    )
}

pub async fn seed_tenant(store: &InMemoryStore, slug: &str, vat: i32) {
    store
        .create(&Tenant::new(slug, &format!("Friterie {slug}"), Utc::now()).unwrap())
        .await
        .unwrap();
    store
        .save_settings(&TenantSettings::validated(slug, vat, "Friterie", "Markt 1", None).unwrap())
        .await
        .unwrap();
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}
