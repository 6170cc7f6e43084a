//! Ammo file loading and provider construction
mod common;

use std::sync::Arc;
use std::time::Duration;

use quicshot::config::load_ammo_config;
use quicshot::engine::ScenarioGun;
use quicshot::path::IteratorState;
use quicshot::scenario::AmmoProvider;
use serde_json::json;

use common::{fixture, MemoryAggregator, MockClient, Reply};

fn provider(name: &str) -> AmmoProvider {
    let path = fixture(name);
    let config = load_ammo_config(&path).unwrap();
    AmmoProvider::from_config(&config, path.parent().unwrap(), Arc::new(IteratorState::new(0))).unwrap()
}

#[test]
fn test_yaml_ammo_builds_weighted_cycle() {
    let provider = provider("ammo.yaml");

    // weights 50:100 reduce to 1:2
    assert_eq!(provider.cycle_len(), 3);
    let names: Vec<String> = (0..6).map(|_| provider.next().name().to_string()).collect();
    assert_eq!(names, ["browse", "login_only", "login_only", "browse", "login_only", "login_only"]);
}

#[test]
fn test_yaml_ammo_steps() {
    let provider = provider("ammo.yaml");
    let browse = provider.next();
    let steps = &browse.scenario().steps;

    let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["auth", "list", "list"]);
    assert_eq!(steps[0].method, http::Method::POST);
    assert_eq!(steps[0].tag, "auth");
    assert_eq!(steps[1].tag, "listing");
    assert_eq!(steps[1].method, http::Method::GET);

    let login = provider.next();
    assert_eq!(login.scenario().steps.len(), 1);
    assert_eq!(login.scenario().steps[0].sleep, Duration::from_millis(10));
}

#[test]
fn test_yaml_ammo_sources() {
    let provider = provider("ammo.yaml");
    let store = provider.store();

    assert_eq!(
        store.source("users"),
        Some(&json!([
            {"id": "1", "name": "alice", "role": "admin"},
            {"id": "2", "name": "bob", "role": "user"},
            {"id": "3", "name": "carol", "role": ""}
        ]))
    );
    assert_eq!(store.source("filter").unwrap()["limit"], json!(20));
    assert_eq!(store.source("global"), Some(&json!({"page_size": 50})));
    assert_eq!(store.globals().get("hostname"), Some(&json!("shop.test")));
}

#[test]
fn test_toml_ammo() {
    let provider = provider("ammo.toml");
    let ammo = provider.next();
    assert_eq!(ammo.name(), "health");
    assert_eq!(ammo.scenario().steps.len(), 3);
}

#[tokio::test]
async fn test_loaded_scenario_shoots() {
    let provider = provider("ammo.yaml");
    let client = MockClient::new([
        Reply::json(200, json!({"token": "t-alice"})),
        Reply::status(200),
        Reply::status(200),
        Reply::json(200, json!({"token": "t-bob"})),
    ]);
    let samples = Arc::new(MemoryAggregator::default());
    let gun = ScenarioGun::new(Arc::new(client), samples.clone())
        .with_target(Some("http://127.0.0.1:9000".parse().unwrap()));

    gun.shoot_ammo(&provider.next()).await.unwrap();
    gun.shoot_ammo(&provider.next()).await.unwrap();

    let requests = gun.client().requests();
    assert_eq!(requests.len(), 4);

    assert_eq!(requests[0].url.as_str(), "http://127.0.0.1:9000/auth");
    assert_eq!(requests[0].headers["host"], "shop.test");
    assert_eq!(requests[0].body.as_deref(), Some(&br#"{"user": "alice"}"#[..]));

    assert_eq!(requests[1].url.as_str(), "http://127.0.0.1:9000/items?category=books&size=50");
    assert_eq!(requests[1].headers["authorization"], "Bearer t-alice");

    // users[next] is shared across shots
    assert_eq!(requests[3].body.as_deref(), Some(&br#"{"user": "bob"}"#[..]));

    let tags: Vec<String> = samples.samples().into_iter().map(|s| s.tag).collect();
    assert_eq!(tags, ["browse.auth", "browse.listing", "browse.listing", "login_only.auth"]);
}

#[test]
fn test_missing_ammo_file() {
    assert!(load_ammo_config(&fixture("does-not-exist.yaml")).is_err());
}
