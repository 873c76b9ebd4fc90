//! In-process client answering from canned responses.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ApiRequest, Endpoint, EsClient, FetchError};

#[derive(Debug, Clone)]
pub enum Reply {
    Body(Value),
    Timeout,
    Status(u16),
}

#[derive(Debug, Default)]
pub struct FakeClient {
    replies: Mutex<HashMap<Endpoint, Reply>>,
    calls: Mutex<HashMap<Endpoint, usize>>,
    total: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, endpoint: Endpoint, reply: Reply) -> Self {
        self.set(endpoint, reply);
        self
    }

    pub fn set(&self, endpoint: Endpoint, reply: Reply) {
        self.replies.lock().unwrap().insert(endpoint, reply);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EsClient for FakeClient {
    async fn execute(&self, request: &ApiRequest, timeout: Duration) -> Result<Value, FetchError> {
        let endpoint = request.endpoint;
        *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self.replies.lock().unwrap().get(&endpoint).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Timeout) => Err(FetchError::Timeout { endpoint, timeout }),
            Some(Reply::Status(status)) => Err(FetchError::Status {
                endpoint,
                status,
                body: String::new(),
            }),
            None => Err(FetchError::Status {
                endpoint,
                status: 404,
                body: "no canned reply".to_string(),
            }),
        }
    }
}
