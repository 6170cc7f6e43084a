//! Common test utilities for quicshot integration tests
//!
//! - A scripted [`MockClient`] answering requests from a queue
//! - An in-memory [`MemoryAggregator`] collecting samples
//! - Fixture paths and small builders

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderValue, StatusCode};
use indexmap::IndexMap;
use quicshot::aggregator::Aggregator;
use quicshot::client::{Client, ClientError, Request, Response, ResponseBody, ResponseHead};
use quicshot::engine::ScenarioGun;
use quicshot::path::IteratorState;
use quicshot::process::{Postprocessor, Preprocessor};
use quicshot::sample::Sample;
use quicshot::scenario::{Ammo, Scenario};
use quicshot::store::VariableStore;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    Ok {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: String,
        delay: Duration,
    },
    Err(ClientError),
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Ok {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Reply::status(status)
            .header("Content-Type", "application/json")
            .body(body.to_string())
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        if let Reply::Ok { headers, .. } = &mut self {
            headers.push((name, value));
        }
        self
    }

    pub fn body(mut self, text: impl Into<String>) -> Self {
        if let Reply::Ok { body, .. } = &mut self {
            *body = text.into();
        }
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        if let Reply::Ok { delay, .. } = &mut self {
            *delay = d;
        }
        self
    }
}

/// Answers requests in order; 200 with an empty body once the script runs out
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl MockClient {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Client for MockClient {
    async fn send(&self, req: Request) -> Result<Response, ClientError> {
        self.requests.lock().unwrap().push(req);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::status(200));

        match reply {
            Reply::Ok { status, headers, body, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let mut head = ResponseHead::new(StatusCode::from_u16(status).unwrap());
                for (name, value) in headers {
                    head.headers.append(name, HeaderValue::from_static(value));
                }
                Ok(Response {
                    head,
                    body: ResponseBody::from_bytes(body),
                })
            }
            Reply::Err(e) => Err(e),
        }
    }
}

/// Answers `?user=<name>` with `{"token": "tok-<name>"}` after a per-user
/// delay, so concurrent shots interleave
pub struct TokenClient {
    delays: Vec<(&'static str, Duration)>,
    requests: Mutex<Vec<Request>>,
}

impl TokenClient {
    pub fn new(delays: &[(&'static str, Duration)]) -> Self {
        Self {
            delays: delays.to_vec(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Client for TokenClient {
    async fn send(&self, req: Request) -> Result<Response, ClientError> {
        let user = query_param(&req, "user").unwrap_or_default();
        let delay = self
            .delays
            .iter()
            .find(|(name, _)| *name == user)
            .map(|(_, d)| *d)
            .unwrap_or_default();
        self.requests.lock().unwrap().push(req);

        tokio::time::sleep(delay).await;
        let body = serde_json::json!({"token": format!("tok-{}", user)}).to_string();
        Ok(Response {
            head: ResponseHead::new(StatusCode::OK),
            body: ResponseBody::from_bytes(body),
        })
    }
}

pub fn query_param(req: &Request, key: &str) -> Option<String> {
    req.url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[derive(Default)]
pub struct MemoryAggregator {
    samples: Mutex<Vec<Sample>>,
}

impl MemoryAggregator {
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }
}

impl Aggregator for MemoryAggregator {
    fn report(&self, sample: Sample) {
        self.samples.lock().unwrap().push(sample);
    }
}

/// Gun aimed at a fake target with an in-memory sample sink
pub fn gun(client: MockClient) -> (ScenarioGun<MockClient>, Arc<MemoryAggregator>) {
    let samples = Arc::new(MemoryAggregator::default());
    let gun = ScenarioGun::new(Arc::new(client), samples.clone())
        .with_target(Some("http://target.test".parse().unwrap()));
    (gun, samples)
}

pub fn ammo(scenario: Scenario) -> Ammo {
    ammo_with_store(scenario, VariableStore::new())
}

pub fn ammo_with_store(scenario: Scenario, store: VariableStore) -> Ammo {
    Ammo::new(1, Arc::new(scenario), Arc::new(store))
}

pub fn preprocessor(pairs: &[(&str, &str)]) -> Preprocessor {
    let mapping: IndexMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Preprocessor::new(mapping, Arc::new(IteratorState::new(0)))
}

pub fn postprocessor(value: serde_json::Value) -> Postprocessor {
    serde_json::from_value(value).unwrap()
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
